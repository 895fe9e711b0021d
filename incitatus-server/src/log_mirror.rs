//! Mirrors warnings and errors into the bound bot-log channel.
//!
//! [`BotLogLayer`] only formats and enqueues; posting happens on the
//! [`run_log_mirror`] task so logging never waits on the network.

use incitatus_core::config::{BotConfig, ConfigStore};
use incitatus_core::platform::{ChatPlatform, OutgoingMessage};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Longest record posted inline; longer ones become an attachment.
const MAX_INLINE: usize = 1950;

pub struct BotLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

/// A layer and the receiving end of its queue.
pub fn bot_log_layer() -> (BotLogLayer, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BotLogLayer { tx }, rx)
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for BotLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN {
            return;
        }
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{}:{}:{}{}",
            metadata.level(),
            metadata.target(),
            visitor.message,
            visitor.fields
        );
        // the receiver is gone only during shutdown
        let _ = self.tx.send(line);
    }
}

/// The message posted for one record.
pub fn mirror_message(line: &str) -> OutgoingMessage {
    if line.chars().count() <= MAX_INLINE {
        OutgoingMessage::text(format!("```{line}```"))
    } else {
        OutgoingMessage::file("Stack-trace grande:", "log.txt", line.as_bytes().to_vec())
    }
}

/// Post queued records until shutdown. Records arriving while no bot-log
/// channel is bound are dropped.
pub async fn run_log_mirror(
    mut rx: mpsc::UnboundedReceiver<String>,
    config: ConfigStore<BotConfig>,
    platform: Arc<dyn ChatPlatform>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            line = rx.recv() => {
                let Some(line) = line else { break };
                let Some(channel) = config.read().await.bot_log_channel else {
                    continue;
                };
                if let Err(e) = platform.send_message(channel, &mirror_message(&line)).await {
                    tracing::debug!(error = %e, "Failed to mirror log record");
                }
            }
        }
    }
}
