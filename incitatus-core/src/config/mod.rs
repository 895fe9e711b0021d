//! Runtime configuration of the bot.
//!
//! [`BotConfig`] is the persisted document of channel bindings and anchor
//! message ids, mutated at runtime through a [`ConfigStore`].
//! [`BotSettings`] holds the static knobs the server reads from its
//! settings file at startup.

mod bot_settings;
mod config_store;

pub use bot_settings::BotSettings;
pub use config_store::ConfigStore;

use crate::ids::{ChannelId, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel bindings, anchor message ids and the event counter.
///
/// Unknown keys in the stored document are ignored and missing keys take
/// their default, so documents written by older versions still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub event_channel: Option<ChannelId>,
    pub participate_channel: Option<ChannelId>,
    pub event_log_channel: Option<ChannelId>,
    pub guild_channel: Option<ChannelId>,
    pub bot_log_channel: Option<ChannelId>,
    pub ranking_channel: Option<ChannelId>,
    pub split_channel: Option<ChannelId>,
    pub baltop_channel: Option<ChannelId>,
    pub info_channel: Option<ChannelId>,
    pub register_channel: Option<ChannelId>,

    pub event_msg_id: Option<MessageId>,
    pub participate_msg_id: Option<MessageId>,
    pub info_msg_id: Option<MessageId>,
    pub ranking_msg_id: Option<MessageId>,
    pub baltop_msg_id: Option<MessageId>,
    pub register_msg_id: Option<MessageId>,

    pub event_count: u64,
}

impl BotConfig {
    /// Every anchor id currently recorded, for any surface.
    pub fn anchors(&self) -> impl Iterator<Item = MessageId> + '_ {
        Surface::ALL.into_iter().filter_map(|s| s.anchor(self))
    }
}

/// The logical purpose a channel can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Event,
    Participate,
    EventLog,
    Guild,
    BotLog,
    Ranking,
    Split,
    Baltop,
    Info,
    Register,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 10] = [
        ChannelRole::Event,
        ChannelRole::Participate,
        ChannelRole::EventLog,
        ChannelRole::Guild,
        ChannelRole::BotLog,
        ChannelRole::Ranking,
        ChannelRole::Split,
        ChannelRole::Baltop,
        ChannelRole::Info,
        ChannelRole::Register,
    ];

    /// Name of the slash command that binds this role.
    pub fn command_name(self) -> &'static str {
        match self {
            ChannelRole::Event => "set-event-channel",
            ChannelRole::Participate => "set-participate-channel",
            ChannelRole::EventLog => "set-eventlog-channel",
            ChannelRole::Guild => "set-guild-channel",
            ChannelRole::BotLog => "set-botlog-channel",
            ChannelRole::Ranking => "set-ranking-channel",
            ChannelRole::Split => "set-split-channel",
            ChannelRole::Baltop => "set-baltop-channel",
            ChannelRole::Info => "set-info-channel",
            ChannelRole::Register => "set-register-channel",
        }
    }

    /// Human-readable label used in command descriptions and replies.
    pub fn label(self) -> &'static str {
        match self {
            ChannelRole::Event => "canal de eventos",
            ChannelRole::Participate => "canal de participação",
            ChannelRole::EventLog => "canal de event-log",
            ChannelRole::Guild => "canal de entrada e saída",
            ChannelRole::BotLog => "canal de logs do bot",
            ChannelRole::Ranking => "canal de ranking",
            ChannelRole::Split => "canal de balanço",
            ChannelRole::Baltop => "canal de baltop",
            ChannelRole::Info => "canal de info da guild",
            ChannelRole::Register => "canal de registro de membros",
        }
    }

    pub fn get(self, config: &BotConfig) -> Option<ChannelId> {
        match self {
            ChannelRole::Event => config.event_channel,
            ChannelRole::Participate => config.participate_channel,
            ChannelRole::EventLog => config.event_log_channel,
            ChannelRole::Guild => config.guild_channel,
            ChannelRole::BotLog => config.bot_log_channel,
            ChannelRole::Ranking => config.ranking_channel,
            ChannelRole::Split => config.split_channel,
            ChannelRole::Baltop => config.baltop_channel,
            ChannelRole::Info => config.info_channel,
            ChannelRole::Register => config.register_channel,
        }
    }

    pub fn slot(self, config: &mut BotConfig) -> &mut Option<ChannelId> {
        match self {
            ChannelRole::Event => &mut config.event_channel,
            ChannelRole::Participate => &mut config.participate_channel,
            ChannelRole::EventLog => &mut config.event_log_channel,
            ChannelRole::Guild => &mut config.guild_channel,
            ChannelRole::BotLog => &mut config.bot_log_channel,
            ChannelRole::Ranking => &mut config.ranking_channel,
            ChannelRole::Split => &mut config.split_channel,
            ChannelRole::Baltop => &mut config.baltop_channel,
            ChannelRole::Info => &mut config.info_channel,
            ChannelRole::Register => &mut config.register_channel,
        }
    }

    /// The surface rendered in a channel of this role, if any.
    pub fn surface(self) -> Option<Surface> {
        Surface::ALL.into_iter().find(|s| s.channel_role() == self)
    }
}

/// Binding command name -> channel role, built once at startup.
#[derive(Debug, Clone)]
pub struct ChannelBindingTable {
    by_command: HashMap<&'static str, ChannelRole>,
}

impl ChannelBindingTable {
    pub fn new() -> Self {
        Self {
            by_command: ChannelRole::ALL
                .into_iter()
                .map(|role| (role.command_name(), role))
                .collect(),
        }
    }

    pub fn lookup(&self, command: &str) -> Option<ChannelRole> {
        self.by_command.get(command).copied()
    }
}

impl Default for ChannelBindingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed "anchor" message the bot keeps up to date in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// Administrative create/end/cancel controls.
    EventPanel,
    /// Join/leave controls with the live participant list.
    ParticipationPanel,
    /// Current in-game guild member count.
    RosterInfo,
    RankingBoard,
    BalanceBoard,
    RegistrationBanner,
}

impl Surface {
    pub const COUNT: usize = 6;

    pub const ALL: [Surface; Self::COUNT] = [
        Surface::EventPanel,
        Surface::ParticipationPanel,
        Surface::RosterInfo,
        Surface::RankingBoard,
        Surface::BalanceBoard,
        Surface::RegistrationBanner,
    ];

    /// Stable position in [`Surface::ALL`].
    pub fn index(self) -> usize {
        match self {
            Surface::EventPanel => 0,
            Surface::ParticipationPanel => 1,
            Surface::RosterInfo => 2,
            Surface::RankingBoard => 3,
            Surface::BalanceBoard => 4,
            Surface::RegistrationBanner => 5,
        }
    }

    pub fn channel_role(self) -> ChannelRole {
        match self {
            Surface::EventPanel => ChannelRole::Event,
            Surface::ParticipationPanel => ChannelRole::Participate,
            Surface::RosterInfo => ChannelRole::Info,
            Surface::RankingBoard => ChannelRole::Ranking,
            Surface::BalanceBoard => ChannelRole::Baltop,
            Surface::RegistrationBanner => ChannelRole::Register,
        }
    }

    pub fn channel(self, config: &BotConfig) -> Option<ChannelId> {
        self.channel_role().get(config)
    }

    pub fn anchor(self, config: &BotConfig) -> Option<MessageId> {
        match self {
            Surface::EventPanel => config.event_msg_id,
            Surface::ParticipationPanel => config.participate_msg_id,
            Surface::RosterInfo => config.info_msg_id,
            Surface::RankingBoard => config.ranking_msg_id,
            Surface::BalanceBoard => config.baltop_msg_id,
            Surface::RegistrationBanner => config.register_msg_id,
        }
    }

    pub fn anchor_slot(self, config: &mut BotConfig) -> &mut Option<MessageId> {
        match self {
            Surface::EventPanel => &mut config.event_msg_id,
            Surface::ParticipationPanel => &mut config.participate_msg_id,
            Surface::RosterInfo => &mut config.info_msg_id,
            Surface::RankingBoard => &mut config.ranking_msg_id,
            Surface::BalanceBoard => &mut config.baltop_msg_id,
            Surface::RegistrationBanner => &mut config.register_msg_id,
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Surface::EventPanel => "event-panel",
            Surface::ParticipationPanel => "participation-panel",
            Surface::RosterInfo => "roster-info",
            Surface::RankingBoard => "ranking-board",
            Surface::BalanceBoard => "balance-board",
            Surface::RegistrationBanner => "registration-banner",
        };
        f.write_str(name)
    }
}
