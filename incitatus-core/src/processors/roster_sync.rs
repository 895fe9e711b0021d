//! RosterReconciliationLoop processor.
//!
//! The roster loop is responsible for:
//! - Polling the in-game guild roster on a fixed period
//! - Retrying a failed fetch over a short backoff schedule
//! - Announcing members who joined or left since the last good poll
//! - Replacing the stored snapshot and refreshing the roster-info panel
//!
//! A round that cannot fetch the roster changes nothing.

use crate::config::Surface;
use crate::context::BotContext;
use crate::entities::{GetRoster, ReplaceRoster, RosterSnapshot};
use crate::framework::StoreError;
use crate::game_data::GameDataError;
use crate::ids::ChannelId;
use crate::platform::{Embed, OutgoingMessage};
use crate::processors::surfaces::SurfaceReconciler;
use crate::utils::format::format_fame;
use crate::utils::retry::retry_with_backoff;
use incitatus_sdk::objects::GuildMember;
use kanau::processor::Processor;
use std::collections::HashMap;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

const WELCOME_COLOR: u32 = 0x3498db;
const DEPARTURE_COLOR: u32 = 0xe74c3c;

/// Names that appeared and disappeared between two snapshots, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub joined: Vec<String>,
    pub left: Vec<String>,
}

pub fn diff_roster(previous: &RosterSnapshot, current: &RosterSnapshot) -> RosterDiff {
    RosterDiff {
        joined: current.difference(previous).cloned().collect(),
        left: previous.difference(current).cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No announcement channel is bound.
    Skipped,
    /// Every fetch attempt failed; the snapshot is unchanged.
    Failed,
    Applied {
        joined: usize,
        left: usize,
        members: usize,
    },
}

pub struct RosterSync {
    ctx: BotContext,
}

impl RosterSync {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    /// Run rounds until shutdown. The first round starts immediately.
    ///
    /// Rounds run inline, so a slow round delays the next one instead of
    /// overlapping it.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.ctx.settings.roster_period;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Roster sync started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Roster sync received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_round().await {
                        error!(error = %e, "Roster round failed to persist");
                    }
                }
            }
        }
    }

    #[tracing::instrument(skip_all, err, name = "RosterSync:round")]
    pub async fn run_round(&self) -> Result<RoundOutcome, StoreError> {
        let Some(channel) = self.ctx.config.read().await.guild_channel else {
            warn!("Guild channel not configured, skipping roster round");
            return Ok(RoundOutcome::Skipped);
        };

        let schedule = &self.ctx.settings.roster_backoff;
        let game_data = self.ctx.game_data.clone();
        let fetched = retry_with_backoff(
            "game data roster",
            schedule,
            GameDataError::is_transient,
            |_| {
                let game_data = game_data.clone();
                async move { game_data.guild_members().await }
            },
        )
        .await;
        let members = match fetched {
            Ok(members) => members,
            Err(exhausted) => {
                warn!(
                    attempts = exhausted.attempts,
                    "Roster fetch failed, abandoning round"
                );
                return Ok(RoundOutcome::Failed);
            }
        };

        let current: RosterSnapshot = members.iter().map(|m| m.name.clone()).collect();
        let by_name: HashMap<&str, &GuildMember> =
            members.iter().map(|m| (m.name.as_str(), m)).collect();
        let previous = self.ctx.ledgers.process(GetRoster).await?;
        let diff = diff_roster(&previous, &current);

        let now = OffsetDateTime::now_utc().to_offset(self.ctx.settings.local_offset);
        for name in &diff.joined {
            if let Some(member) = by_name.get(name.as_str()) {
                self.announce(channel, &welcome_notice(member, now)).await;
            }
        }
        for name in &diff.left {
            self.announce(channel, &departure_notice(name)).await;
        }

        let outcome = RoundOutcome::Applied {
            joined: diff.joined.len(),
            left: diff.left.len(),
            members: current.len(),
        };
        self.ctx
            .ledgers
            .process(ReplaceRoster { names: current })
            .await?;
        SurfaceReconciler::new(&self.ctx)
            .refresh_logged(Surface::RosterInfo)
            .await;

        info!(?outcome, "Roster round applied");
        Ok(outcome)
    }

    async fn announce(&self, channel: ChannelId, message: &OutgoingMessage) {
        if let Err(e) = self.ctx.platform.send_message(channel, message).await {
            warn!(%channel, error = %e, "Failed to post roster notification");
        }
    }
}

pub fn welcome_notice(member: &GuildMember, joined_at: OffsetDateTime) -> OutgoingMessage {
    let stamp = joined_at
        .format(format_description!(
            "[day]/[month]/[year] [hour]:[minute]"
        ))
        .unwrap_or_default();
    OutgoingMessage::embed(
        Embed::titled(format!("Bem-vindo(a) {}!", member.name), WELCOME_COLOR)
            .field("🏹 Fama PvP", format_fame(member.pvp_fame()), true)
            .field("🧌 Fama PvE", format_fame(member.pve_fame()), true)
            .field("🏆 Fama Total", format_fame(member.total_fame()), false)
            .footer(format!("Ingressou em: {stamp}")),
    )
}

pub fn departure_notice(name: &str) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::titled(format!("{name} deixou a guilda."), DEPARTURE_COLOR)
            .description("Romani ite domum!"),
    )
}
