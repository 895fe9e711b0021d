//! EventStateMachine processor.
//!
//! The EventStateMachine is responsible for:
//! - Owning the running/idle state and the participant set
//! - Allocating event ids that never repeat, even if the counter drifted
//! - Crediting the ranking and writing the log artifact on completion
//! - Refreshing the event and participation panels after every transition
//!
//! Administrative transitions from unauthorized callers, and transitions
//! that do not fit the current state, are ignored without an error.

use crate::config::Surface;
use crate::context::BotContext;
use crate::entities::IncrementRanking;
use crate::framework::StoreError;
use crate::ids::UserId;
use crate::platform::{Caller, OutgoingMessage, display_names};
use crate::processors::surfaces::SurfaceReconciler;
use indexmap::IndexSet;
use kanau::processor::Processor;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LOG_ARTIFACT: Option<Regex> = Regex::new(r"evento_(\d+)\.txt").ok();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventState {
    pub running: bool,
    /// Id of the current event, or of the last one while idle.
    pub event_id: u64,
    /// In join order.
    pub participants: IndexSet<UserId>,
}

impl EventState {
    pub fn idle(event_id: u64) -> Self {
        Self {
            running: false,
            event_id,
            participants: IndexSet::new(),
        }
    }
}

/// A control on the event or participation panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelAction {
    Create,
    End,
    Cancel,
    Join,
    Leave,
}

impl PanelAction {
    pub const ALL: [PanelAction; 5] = [
        PanelAction::Create,
        PanelAction::End,
        PanelAction::Cancel,
        PanelAction::Join,
        PanelAction::Leave,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            PanelAction::Create => "evt_create",
            PanelAction::End => "evt_end",
            PanelAction::Cancel => "evt_cancel",
            PanelAction::Join => "join_evt",
            PanelAction::Leave => "leave_evt",
        }
    }

    /// The panel the control lives on.
    pub fn surface(self) -> Surface {
        match self {
            PanelAction::Create | PanelAction::End | PanelAction::Cancel => Surface::EventPanel,
            PanelAction::Join | PanelAction::Leave => Surface::ParticipationPanel,
        }
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.custom_id() == custom_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { event_id: u64 },
    Ignored,
}

pub struct EventMachine<'a> {
    ctx: &'a BotContext,
}

impl<'a> EventMachine<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    pub async fn state(&self) -> EventState {
        self.ctx.event.lock().await.clone()
    }

    /// Dispatch a panel control pressed by `caller`.
    pub async fn apply(&self, action: PanelAction, caller: &Caller) -> Result<Transition, StoreError> {
        match action {
            PanelAction::Create => self.create(caller).await,
            PanelAction::End => self.finish(caller, false).await,
            PanelAction::Cancel => self.finish(caller, true).await,
            PanelAction::Join => Ok(self.join(caller.user).await),
            PanelAction::Leave => Ok(self.leave(caller.user).await),
        }
    }

    /// Idle -> Running.
    ///
    /// The new id is one past the larger of the persisted counter and the
    /// last id found in the event log, and is persisted before the event
    /// becomes visible as running.
    #[tracing::instrument(skip_all, err, name = "EventMachine:create")]
    pub async fn create(&self, caller: &Caller) -> Result<Transition, StoreError> {
        if !self.authorized(caller) {
            return Ok(Transition::Ignored);
        }
        let event_id = {
            let mut state = self.ctx.event.lock().await;
            if state.running {
                tracing::debug!(event_id = state.event_id, "Event already running");
                return Ok(Transition::Ignored);
            }
            let logged = self.last_logged_event().await;
            let persisted = self.ctx.config.read().await.event_count;
            let event_id = logged.max(persisted) + 1;

            self.ctx
                .config
                .update(|config| config.event_count = event_id)
                .await?;
            *state = EventState {
                running: true,
                event_id,
                participants: IndexSet::new(),
            };
            event_id
        };

        self.refresh_panels().await;
        tracing::info!(event_id, "Event #{event_id} started ✅");
        Ok(Transition::Applied { event_id })
    }

    /// Add `user` to the running event. Ignored while idle.
    pub async fn join(&self, user: UserId) -> Transition {
        let event_id = {
            let mut state = self.ctx.event.lock().await;
            if !state.running {
                return Transition::Ignored;
            }
            state.participants.insert(user);
            state.event_id
        };
        SurfaceReconciler::new(self.ctx)
            .refresh_logged(Surface::ParticipationPanel)
            .await;
        Transition::Applied { event_id }
    }

    /// Remove `user` from the running event. Ignored while idle.
    pub async fn leave(&self, user: UserId) -> Transition {
        let event_id = {
            let mut state = self.ctx.event.lock().await;
            if !state.running {
                return Transition::Ignored;
            }
            state.participants.shift_remove(&user);
            state.event_id
        };
        SurfaceReconciler::new(self.ctx)
            .refresh_logged(Surface::ParticipationPanel)
            .await;
        Transition::Applied { event_id }
    }

    pub async fn end(&self, caller: &Caller) -> Result<Transition, StoreError> {
        self.finish(caller, false).await
    }

    pub async fn cancel(&self, caller: &Caller) -> Result<Transition, StoreError> {
        self.finish(caller, true).await
    }

    /// Running -> Idle.
    ///
    /// A completed (not cancelled) event with participants is written to
    /// the event log and credited to the ranking; a cancelled one is
    /// dropped without a trace.
    #[tracing::instrument(skip_all, err, name = "EventMachine:finish", fields(cancelled = cancelled))]
    async fn finish(&self, caller: &Caller, cancelled: bool) -> Result<Transition, StoreError> {
        if !self.authorized(caller) {
            return Ok(Transition::Ignored);
        }
        let (event_id, participants) = {
            let mut state = self.ctx.event.lock().await;
            if !state.running {
                tracing::debug!("No running event");
                return Ok(Transition::Ignored);
            }
            state.running = false;
            (state.event_id, std::mem::take(&mut state.participants))
        };

        self.refresh_panels().await;

        let log_channel = self.ctx.config.read().await.event_log_channel;
        let log_channel = log_channel.filter(|_| !cancelled && !participants.is_empty());
        if let Some(channel) = log_channel {
            let users: Vec<UserId> = participants.into_iter().collect();
            let names = display_names(self.ctx.platform.as_ref(), self.ctx.guild, &users).await;
            let artifact = log_artifact(event_id, &names);
            if let Err(e) = self.ctx.platform.send_message(channel, &artifact).await {
                tracing::warn!(event_id, error = %e, "Failed to post the event log");
            }

            self.ctx.ledgers.process(IncrementRanking { users }).await?;
            SurfaceReconciler::new(self.ctx)
                .refresh_logged(Surface::RankingBoard)
                .await;
        }

        if cancelled {
            tracing::info!(event_id, "Event #{event_id} cancelled ❌");
        } else {
            tracing::info!(event_id, "Event #{event_id} ended 🛑");
        }
        Ok(Transition::Applied { event_id })
    }

    fn authorized(&self, caller: &Caller) -> bool {
        let allowed = caller.is_admin(&self.ctx.settings.admin_role);
        if !allowed {
            tracing::debug!(user = %caller.user, "Ignoring unauthorized panel action");
        }
        allowed
    }

    async fn refresh_panels(&self) {
        let reconciler = SurfaceReconciler::new(self.ctx);
        reconciler.refresh_logged(Surface::EventPanel).await;
        reconciler.refresh_logged(Surface::ParticipationPanel).await;
    }

    /// Highest event id among recent bot-authored log artifacts, or 0.
    async fn last_logged_event(&self) -> u64 {
        let Some(channel) = self.ctx.config.read().await.event_log_channel else {
            return 0;
        };
        let limit = self.ctx.settings.log_scan_limit;
        match self.ctx.platform.recent_messages(channel, limit).await {
            Ok(messages) => messages
                .iter()
                .filter(|m| m.from_self)
                .find_map(|m| m.attachment_names.first().and_then(|name| parse_log_number(name)))
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!(%channel, error = %e, "Could not scan the event log");
                0
            }
        }
    }
}

/// Event id encoded in a log artifact file name.
pub fn parse_log_number(filename: &str) -> Option<u64> {
    LOG_ARTIFACT
        .as_ref()?
        .captures(filename)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// The `evento_<id>.txt` roster attachment.
pub fn log_artifact(event_id: u64, names: &[String]) -> OutgoingMessage {
    let mut body = format!("Evento #{event_id} - {} participantes", names.len());
    for name in names {
        body.push('\n');
        body.push_str(name);
    }
    OutgoingMessage {
        attachment: Some(crate::platform::Attachment {
            filename: format!("evento_{event_id}.txt"),
            data: body.into_bytes(),
        }),
        ..OutgoingMessage::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelRole;
    use crate::entities::TopRanking;
    use crate::ids::ChannelId;
    use crate::platform::ChannelMessage;
    use crate::testing::{TestBot, admin, member};

    #[test]
    fn custom_ids_round_trip() {
        for action in PanelAction::ALL {
            assert_eq!(PanelAction::from_custom_id(action.custom_id()), Some(action));
        }
        assert_eq!(PanelAction::from_custom_id("evt_unknown"), None);
    }

    #[test]
    fn log_numbers() {
        assert_eq!(parse_log_number("evento_42.txt"), Some(42));
        assert_eq!(parse_log_number("log.txt"), None);
    }

    #[test]
    fn artifact_body() {
        let artifact = log_artifact(7, &["Brutus".into(), "<9>".into()]);
        let file = artifact.attachment.unwrap();
        assert_eq!(file.filename, "evento_7.txt");
        assert_eq!(
            String::from_utf8(file.data).unwrap(),
            "Evento #7 - 2 participantes\nBrutus\n<9>"
        );
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let bot = TestBot::new().await;
        let machine = EventMachine::new(&bot.ctx);

        let first = machine.create(&admin(1)).await.unwrap();
        assert_eq!(first, Transition::Applied { event_id: 1 });
        let second = machine.create(&admin(1)).await.unwrap();
        assert_eq!(second, Transition::Ignored);

        let state = machine.state().await;
        assert!(state.running);
        assert_eq!(state.event_id, 1);
        assert_eq!(bot.ctx.config.read().await.event_count, 1);
    }

    #[tokio::test]
    async fn unauthorized_callers_are_ignored() {
        let bot = TestBot::new().await;
        let machine = EventMachine::new(&bot.ctx);

        assert_eq!(machine.create(&member(5)).await.unwrap(), Transition::Ignored);
        assert!(!machine.state().await.running);

        machine.create(&admin(1)).await.unwrap();
        assert_eq!(machine.end(&member(5)).await.unwrap(), Transition::Ignored);
        assert!(machine.state().await.running);
    }

    #[tokio::test]
    async fn create_skips_past_logged_ids() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::EventLog, ChannelId(30)).await;
        bot.platform.push_history(
            ChannelId(30),
            ChannelMessage {
                id: crate::ids::MessageId(900),
                author: UserId(999),
                from_self: false,
                attachment_names: vec!["evento_80.txt".into()],
            },
        );
        bot.platform.push_history(
            ChannelId(30),
            ChannelMessage {
                id: crate::ids::MessageId(901),
                author: TestBot::SELF_ID,
                from_self: true,
                attachment_names: vec!["evento_12.txt".into()],
            },
        );

        let transition = EventMachine::new(&bot.ctx).create(&admin(1)).await.unwrap();
        assert_eq!(transition, Transition::Applied { event_id: 13 });
        assert_eq!(bot.ctx.config.read().await.event_count, 13);
    }

    #[tokio::test]
    async fn join_and_leave_only_while_running() {
        let bot = TestBot::new().await;
        let machine = EventMachine::new(&bot.ctx);

        assert_eq!(machine.join(UserId(2)).await, Transition::Ignored);
        machine.create(&admin(1)).await.unwrap();
        machine.join(UserId(2)).await;
        machine.join(UserId(3)).await;
        machine.join(UserId(2)).await;
        machine.leave(UserId(3)).await;

        let state = machine.state().await;
        assert_eq!(state.participants.iter().copied().collect::<Vec<_>>(), vec![UserId(2)]);
    }

    #[tokio::test]
    async fn end_credits_ranking_and_writes_log() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::EventLog, ChannelId(30)).await;
        bot.bind(ChannelRole::Participate, ChannelId(31)).await;
        bot.platform.add_member(UserId(2), "Brutus");
        let machine = EventMachine::new(&bot.ctx);

        machine.create(&admin(1)).await.unwrap();
        machine.join(UserId(2)).await;
        machine.join(UserId(3)).await;
        let done = machine.end(&admin(1)).await.unwrap();
        assert_eq!(done, Transition::Applied { event_id: 1 });

        let state = machine.state().await;
        assert!(!state.running);
        assert!(state.participants.is_empty());

        let logs = bot.platform.sent_to(ChannelId(30));
        assert_eq!(logs.len(), 1);
        let file = logs[0].attachment.as_ref().unwrap();
        assert_eq!(file.filename, "evento_1.txt");
        assert_eq!(
            std::str::from_utf8(&file.data).unwrap(),
            "Evento #1 - 2 participantes\nBrutus\n<3>"
        );

        let top = bot.ctx.ledgers.process(TopRanking { limit: 10 }).await.unwrap();
        assert_eq!(top, vec![(UserId(2), 1), (UserId(3), 1)]);

        let panel = bot.platform.current(ChannelId(31)).unwrap();
        assert_eq!(panel.content.as_deref(), Some("Nenhum evento no momento."));
    }

    #[tokio::test]
    async fn end_without_participants_leaves_no_trace() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::EventLog, ChannelId(30)).await;
        let machine = EventMachine::new(&bot.ctx);

        machine.create(&admin(1)).await.unwrap();
        let done = machine.end(&admin(1)).await.unwrap();

        assert_eq!(done, Transition::Applied { event_id: 1 });
        assert!(!machine.state().await.running);
        assert!(bot.platform.sent_to(ChannelId(30)).is_empty());
        let top = bot.ctx.ledgers.process(TopRanking { limit: 10 }).await.unwrap();
        assert!(top.is_empty());
    }

    #[tokio::test]
    async fn cancel_discards_participants() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::EventLog, ChannelId(30)).await;
        let machine = EventMachine::new(&bot.ctx);

        machine.create(&admin(1)).await.unwrap();
        machine.join(UserId(2)).await;
        machine.cancel(&admin(1)).await.unwrap();

        assert!(bot.platform.sent_to(ChannelId(30)).is_empty());
        let top = bot.ctx.ledgers.process(TopRanking { limit: 10 }).await.unwrap();
        assert!(top.is_empty());

        // ids keep increasing after a cancelled event
        let next = machine.create(&admin(1)).await.unwrap();
        assert_eq!(next, Transition::Applied { event_id: 2 });
    }

    #[tokio::test]
    async fn log_failure_still_credits_ranking() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::EventLog, ChannelId(30)).await;
        bot.platform.deny_sends_to(ChannelId(30));
        let machine = EventMachine::new(&bot.ctx);

        machine.create(&admin(1)).await.unwrap();
        machine.join(UserId(2)).await;
        machine.end(&admin(1)).await.unwrap();

        let top = bot.ctx.ledgers.process(TopRanking { limit: 10 }).await.unwrap();
        assert_eq!(top, vec![(UserId(2), 1)]);
    }
}
