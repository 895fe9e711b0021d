//! Per-user rate limiting for commands.

use crate::ids::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// `rate` uses per `per` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub rate: u32,
    pub per: Duration,
}

impl CooldownPolicy {
    pub const fn new(rate: u32, per: Duration) -> Self {
        Self { rate, per }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window usage counters keyed by user.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    policy: CooldownPolicy,
    windows: Arc<Mutex<HashMap<UserId, Window>>>,
}

impl CooldownTracker {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Consume one use for `user`.
    ///
    /// When the window is exhausted, returns how long until it resets;
    /// a rejected call does not count as a use.
    pub async fn try_acquire(&self, user: UserId) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < self.policy.per);

        let window = windows.entry(user).or_insert(Window {
            started: now,
            used: 0,
        });
        if window.used >= self.policy.rate {
            let elapsed = now.duration_since(window.started);
            return Err(self.policy.per.saturating_sub(elapsed));
        }
        window.used += 1;
        Ok(())
    }
}
