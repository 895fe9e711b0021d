//! CleanupScheduler processor.
//!
//! The CleanupScheduler is responsible for:
//! - Keeping at most one pending purge per monitored channel
//! - Restarting the quiet period whenever a new message arrives
//! - Deleting transient messages while sparing anchors and bot messages

use crate::config::{BotConfig, ConfigStore};
use crate::ids::{ChannelId, MessageId};
use crate::platform::{ChatPlatform, PlatformError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

struct PendingPurge {
    cancel: watch::Sender<bool>,
    generation: u64,
}

#[derive(Default)]
struct Pending {
    by_channel: HashMap<ChannelId, PendingPurge>,
    next_generation: u64,
}

/// Debounced, cancelable purges of transient channel messages.
#[derive(Clone)]
pub struct CleanupScheduler {
    platform: Arc<dyn ChatPlatform>,
    config: ConfigStore<BotConfig>,
    delay: Duration,
    scan_limit: usize,
    pending: Arc<Mutex<Pending>>,
}

impl CleanupScheduler {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        config: ConfigStore<BotConfig>,
        delay: Duration,
        scan_limit: usize,
    ) -> Self {
        Self {
            platform,
            config,
            delay,
            scan_limit,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// React to a new guild message. Only messages from other users in the
    /// bound register channel schedule a purge.
    ///
    /// Returns whether a purge was scheduled.
    pub async fn observe(&self, channel: ChannelId, from_self: bool) -> bool {
        if from_self || self.config.read().await.register_channel != Some(channel) {
            return false;
        }
        self.schedule(channel).await;
        true
    }

    /// Purge `channel` after the quiet period, replacing any pending purge.
    pub async fn schedule(&self, channel: ChannelId) {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let generation = {
            let mut pending = self.pending.lock().await;
            let generation = pending.next_generation;
            pending.next_generation += 1;
            let previous = pending.by_channel.insert(
                channel,
                PendingPurge {
                    cancel: cancel_tx,
                    generation,
                },
            );
            if let Some(previous) = previous {
                let _ = previous.cancel.send(true);
                debug!(%channel, "Pending purge replaced");
            }
            generation
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = cancel_rx.changed() => {
                    debug!(%channel, generation, "Purge cancelled");
                    return;
                }

                _ = tokio::time::sleep(scheduler.delay) => {}
            }

            {
                let mut pending = scheduler.pending.lock().await;
                if pending
                    .by_channel
                    .get(&channel)
                    .is_some_and(|p| p.generation == generation)
                {
                    pending.by_channel.remove(&channel);
                }
            }

            match scheduler.purge(channel).await {
                Ok(deleted) => info!(%channel, deleted, "Channel purged"),
                Err(e) => warn!(%channel, error = %e, "Channel purge failed"),
            }
        });
    }

    /// Delete recent messages in `channel`, except anchors and the bot's own.
    ///
    /// A message that cannot be deleted is logged and skipped.
    pub async fn purge(&self, channel: ChannelId) -> Result<usize, PlatformError> {
        let anchors: HashSet<MessageId> = self.config.read().await.anchors().collect();
        let messages = self.platform.recent_messages(channel, self.scan_limit).await?;

        let mut deleted = 0;
        for message in messages {
            if message.from_self || anchors.contains(&message.id) {
                continue;
            }
            match self.platform.delete_message(channel, message.id).await {
                Ok(()) => deleted += 1,
                Err(PlatformError::Forbidden) => {
                    warn!(%channel, message = %message.id, "No permission to delete message");
                }
                Err(PlatformError::NotFound) => {}
                Err(e) => warn!(%channel, message = %message.id, error = %e, "Failed to delete message"),
            }
        }
        Ok(deleted)
    }

    /// Cancel every pending purge.
    pub async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, purge) in pending.by_channel.drain() {
            let _ = purge.cancel.send(true);
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.by_channel.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ChannelRole;
    use crate::ids::{ChannelId, MessageId, UserId};
    use crate::platform::ChannelMessage;
    use crate::testing::TestBot;
    use std::time::Duration;

    const REGISTER: ChannelId = ChannelId(500);

    fn user_message(id: u64) -> ChannelMessage {
        ChannelMessage {
            id: MessageId(id),
            author: UserId(id),
            from_self: false,
            attachment_names: vec![],
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_restarts_the_quiet_period() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::Register, REGISTER).await;
        bot.platform.push_history(REGISTER, user_message(1));
        let cleanup = bot.ctx.cleanup.clone();

        assert!(cleanup.observe(REGISTER, false).await);
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(cleanup.observe(REGISTER, false).await);
        tokio::time::sleep(Duration::from_secs(299)).await;
        settle().await;
        assert!(bot.platform.deleted().is_empty());
        assert_eq!(cleanup.pending_count().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(bot.platform.deleted(), vec![(REGISTER, MessageId(1))]);
        assert_eq!(cleanup.pending_count().await, 0);
    }

    #[tokio::test]
    async fn only_foreign_messages_in_register_channel_qualify() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::Register, REGISTER).await;
        let cleanup = bot.ctx.cleanup.clone();

        assert!(!cleanup.observe(REGISTER, true).await);
        assert!(!cleanup.observe(ChannelId(1), false).await);
        assert_eq!(cleanup.pending_count().await, 0);
    }

    #[tokio::test]
    async fn purge_spares_anchor_and_bot_messages() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::Register, REGISTER).await;
        bot.ctx
            .config
            .update(|c| c.register_msg_id = Some(MessageId(10)))
            .await
            .unwrap();
        bot.platform.push_history(REGISTER, user_message(10));
        bot.platform.push_history(
            REGISTER,
            ChannelMessage {
                id: MessageId(11),
                author: TestBot::SELF_ID,
                from_self: true,
                attachment_names: vec![],
            },
        );
        bot.platform.push_history(REGISTER, user_message(12));
        bot.platform.push_history(REGISTER, user_message(13));
        bot.platform.deny_delete(MessageId(12));

        let deleted = bot.ctx.cleanup.purge(REGISTER).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(bot.platform.deleted(), vec![(REGISTER, MessageId(13))]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending_purges() {
        let bot = TestBot::new().await;
        bot.bind(ChannelRole::Register, REGISTER).await;
        bot.platform.push_history(REGISTER, user_message(1));
        let cleanup = bot.ctx.cleanup.clone();

        cleanup.schedule(REGISTER).await;
        cleanup.cancel_all().await;
        tokio::time::sleep(Duration::from_secs(400)).await;
        settle().await;

        assert!(bot.platform.deleted().is_empty());
    }
}
