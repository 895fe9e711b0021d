//! SurfaceReconciler processor.
//!
//! The SurfaceReconciler is responsible for:
//! - Keeping exactly one anchor message alive per surface
//! - Editing the anchor in place, recreating it when it was deleted
//! - Persisting the anchor id after every reconcile
//! - Rendering each surface deterministically from current state

use crate::config::{ChannelRole, Surface};
use crate::context::BotContext;
use crate::entities::{GetRoster, TopBalances, TopRanking};
use crate::framework::StoreError;
use crate::ids::{MessageId, UserId};
use crate::platform::{Button, ButtonStyle, Embed, OutgoingMessage, PlatformError, display_name};
use crate::processors::event_machine::{EventState, PanelAction};
use crate::utils::format::format_coin;
use kanau::processor::Processor;
use thiserror::Error;

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
const OTHER_PLACE: &str = "🏅";

const RANKING_COLOR: u32 = 0xf1c40f;
const BALANCE_COLOR: u32 = 0x95a5a6;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SurfaceReconciler<'a> {
    ctx: &'a BotContext,
}

impl<'a> SurfaceReconciler<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    /// Make the anchor of `surface` show `desired`.
    ///
    /// Returns `None` when the surface has no channel bound.
    pub async fn reconcile(
        &self,
        surface: Surface,
        desired: &OutgoingMessage,
    ) -> Result<Option<MessageId>, SurfaceError> {
        let _guard = self.ctx.surface_locks[surface.index()].lock().await;
        self.reconcile_locked(surface, desired).await
    }

    /// Render `surface` from current state and reconcile it.
    ///
    /// The surface lock is held from render to edit, so refreshes of one
    /// surface land in the order their state was read. Leaderboards with
    /// no entries are left untouched.
    pub async fn refresh(&self, surface: Surface) -> Result<Option<MessageId>, SurfaceError> {
        let _guard = self.ctx.surface_locks[surface.index()].lock().await;
        match self.render(surface).await? {
            Some(desired) => self.reconcile_locked(surface, &desired).await,
            None => Ok(None),
        }
    }

    /// Caller holds the lock of `surface`.
    #[tracing::instrument(skip_all, err, fields(surface = %surface))]
    async fn reconcile_locked(
        &self,
        surface: Surface,
        desired: &OutgoingMessage,
    ) -> Result<Option<MessageId>, SurfaceError> {
        let (channel, anchor) = {
            let config = self.ctx.config.read().await;
            (surface.channel(&config), surface.anchor(&config))
        };
        let Some(channel) = channel else {
            tracing::debug!(%surface, "No channel bound, skipping");
            return Ok(None);
        };

        let id = match anchor {
            Some(id) => match self.ctx.platform.edit_message(channel, id, desired).await {
                Ok(()) => Some(id),
                Err(PlatformError::NotFound) => {
                    tracing::info!(%surface, anchor = %id, "Anchor message gone, recreating");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        let id = match id {
            Some(id) => id,
            None => self.ctx.platform.send_message(channel, desired).await?,
        };

        self.ctx
            .config
            .update(|config| *surface.anchor_slot(config) = Some(id))
            .await?;
        Ok(Some(id))
    }

    /// [`Self::refresh`], logging instead of returning a failure.
    pub async fn refresh_logged(&self, surface: Surface) {
        if let Err(e) = self.refresh(surface).await {
            tracing::warn!(%surface, error = %e, "Failed to refresh surface");
        }
    }

    /// Refresh every surface in a fixed order.
    pub async fn refresh_all(&self) {
        for surface in Surface::ALL {
            self.refresh_logged(surface).await;
        }
    }

    /// Refresh the surface living in a channel of `role`, if there is one.
    pub async fn refresh_for_role(&self, role: ChannelRole) {
        if let Some(surface) = role.surface() {
            self.refresh_logged(surface).await;
        }
    }

    /// Desired content of `surface`, or `None` when it should not be shown.
    pub async fn render(&self, surface: Surface) -> Result<Option<OutgoingMessage>, SurfaceError> {
        let message = match surface {
            Surface::EventPanel => {
                let state = self.ctx.event.lock().await.clone();
                render_event_panel(&state)
            }
            Surface::ParticipationPanel => {
                let state = self.ctx.event.lock().await.clone();
                let users: Vec<UserId> = state.participants.iter().copied().collect();
                let names = self.names(&users).await;
                render_participation_panel(&state, &names)
            }
            Surface::RosterInfo => {
                let members = self.ctx.ledgers.process(GetRoster).await?.len();
                render_roster_info(members)
            }
            Surface::RankingBoard => {
                let limit = self.ctx.settings.leaderboard_size;
                let top = self.ctx.ledgers.process(TopRanking { limit }).await?;
                if top.is_empty() {
                    return Ok(None);
                }
                let lines = self.board_lines(&top, |count| count.to_string()).await;
                OutgoingMessage::embed(
                    Embed::titled("🏆 Ranking de Participação", RANKING_COLOR)
                        .description(lines.join("\n")),
                )
            }
            Surface::BalanceBoard => {
                let limit = self.ctx.settings.leaderboard_size;
                let top = self.ctx.ledgers.process(TopBalances { limit }).await?;
                if top.is_empty() {
                    return Ok(None);
                }
                let lines = self
                    .board_lines(&top, |balance| format!("`{}`", format_coin(balance)))
                    .await;
                OutgoingMessage::embed(
                    Embed::titled("💰 Top Saldos", BALANCE_COLOR).description(lines.join("\n")),
                )
            }
            Surface::RegistrationBanner => render_registration_banner(),
        };
        Ok(Some(message))
    }

    async fn names(&self, users: &[UserId]) -> Vec<String> {
        crate::platform::display_names(self.ctx.platform.as_ref(), self.ctx.guild, users).await
    }

    async fn board_lines(
        &self,
        top: &[(UserId, u64)],
        value: impl Fn(u64) -> String,
    ) -> Vec<String> {
        let mut lines = Vec::with_capacity(top.len());
        for (index, (user, amount)) in top.iter().enumerate() {
            let name = display_name(self.ctx.platform.as_ref(), self.ctx.guild, *user).await;
            lines.push(leaderboard_line(index, &name, &value(*amount)));
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render_event_panel(state: &EventState) -> OutgoingMessage {
    let content = if state.running {
        format!("**Evento #{}**", state.event_id)
    } else {
        "**Nenhum evento no momento**".to_string()
    };
    OutgoingMessage::text(content).with_buttons(vec![
        panel_button(PanelAction::Create, "Criar evento", "✅", ButtonStyle::Success, state.running),
        panel_button(PanelAction::End, "Encerrar", "🛑", ButtonStyle::Danger, !state.running),
        panel_button(PanelAction::Cancel, "Cancelar", "❌", ButtonStyle::Secondary, !state.running),
    ])
}

/// `names` are the display names of `state.participants`, in order.
pub fn render_participation_panel(state: &EventState, names: &[String]) -> OutgoingMessage {
    if !state.running {
        return OutgoingMessage::text("Nenhum evento no momento.");
    }
    let list = if names.is_empty() {
        "ninguém ainda".to_string()
    } else {
        names.join(", ")
    };
    OutgoingMessage::text(format!(
        "🎉 **Evento #{} aberto!**\nParticipantes ({}): {}",
        state.event_id,
        names.len(),
        list
    ))
    .with_buttons(vec![
        panel_button(PanelAction::Join, "Participar", "✅", ButtonStyle::Success, false),
        panel_button(PanelAction::Leave, "Sair", "⛔", ButtonStyle::Danger, false),
    ])
}

pub fn render_roster_info(members: usize) -> OutgoingMessage {
    OutgoingMessage::text(format!("👥 **Membros atuais da guild:** **{members}**"))
}

pub fn render_registration_banner() -> OutgoingMessage {
    OutgoingMessage::text(
        "🎯 **Registro de membros**\n\
         Use o comando `/register <seu-nome-do-albion>` para liberar o acesso ao servidor.",
    )
}

/// One leaderboard row; `index` is 0-based.
fn leaderboard_line(index: usize, name: &str, value: &str) -> String {
    let icon = MEDALS.get(index).copied().unwrap_or(OTHER_PLACE);
    format!("{icon} {}. **{name}** — {value}", index + 1)
}

fn panel_button(
    action: PanelAction,
    label: &str,
    emoji: &str,
    style: ButtonStyle,
    disabled: bool,
) -> Button {
    Button {
        custom_id: action.custom_id().to_string(),
        label: label.to_string(),
        emoji: Some(emoji.to_string()),
        style,
        disabled,
    }
}
