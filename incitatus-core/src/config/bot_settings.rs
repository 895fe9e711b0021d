//! Static bot settings.

use crate::utils::cooldown::CooldownPolicy;
use std::time::Duration;
use time::UtcOffset;

/// Knobs that are fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Role name (case-insensitive) granting administrative rights in
    /// addition to the manage-guild permission.
    pub admin_role: String,
    /// Role name marking a member as registered.
    pub registered_role: String,
    /// Time between roster reconciliation rounds.
    pub roster_period: Duration,
    /// Delay before each roster fetch attempt; its length is the attempt count.
    pub roster_backoff: Vec<Duration>,
    /// Quiet period before a monitored channel is purged.
    pub cleanup_delay: Duration,
    /// How many recent messages a purge inspects.
    pub purge_scan_limit: usize,
    /// How many recent event-log messages are scanned for the last event id.
    pub log_scan_limit: usize,
    /// Entries shown on the ranking and balance leaderboards.
    pub leaderboard_size: usize,
    pub registration_cooldown: CooldownPolicy,
    /// Offset used for the join timestamp in welcome notifications.
    pub local_offset: UtcOffset,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            admin_role: "senate".to_string(),
            registered_role: "Plebs".to_string(),
            roster_period: Duration::from_secs(30 * 60),
            roster_backoff: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            cleanup_delay: Duration::from_secs(300),
            purge_scan_limit: 100,
            log_scan_limit: 20,
            leaderboard_size: 10,
            registration_cooldown: CooldownPolicy::new(2, Duration::from_secs(30)),
            local_offset: time::macros::offset!(-3),
        }
    }
}
