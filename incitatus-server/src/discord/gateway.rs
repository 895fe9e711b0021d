//! Discord gateway client.
//!
//! One websocket session at a time: HELLO, IDENTIFY, then a heartbeat
//! timer alongside the dispatch read loop. Any session failure leads to a
//! fresh connection after an exponential delay; close codes that can never
//! succeed on retry end the gateway.

use super::model::{GatewayPayload, Hello, INTENTS, Interaction, Message, Ready, opcode};
use crate::bot::Bot;
use crate::state::AppState;
use futures_util::{SinkExt, StreamExt};
use incitatus_core::utils::retry::exponential_delay;
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed: {0}")]
    Closed(String),

    /// Closed with a code that retrying cannot fix (bad token, intents).
    #[error("connection rejected with close code {code}: {reason}")]
    Rejected { code: u16, reason: String },
}

enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Close codes after which reconnecting is pointless.
fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "incitatus",
                "device": "incitatus",
            },
        },
    })
}

fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": seq })
}

pub struct Gateway {
    url: Url,
    token: String,
    bot: Arc<Bot>,
    state: AppState,
}

impl Gateway {
    pub fn new(url: Url, token: String, bot: Arc<Bot>, state: AppState) -> Self {
        Self {
            url,
            token,
            bot,
            state,
        }
    }

    /// Keep a session open until shutdown or a fatal rejection.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), GatewayError> {
        let mut failures: u32 = 0;
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            match self.session(&mut shutdown_rx).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Reconnect) => {
                    failures = 0;
                    info!("Gateway asked to reconnect");
                }
                Err(e @ GatewayError::Rejected { .. }) => {
                    self.state.set_ready(false);
                    error!(error = %e, "Gateway rejected the session");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, failures, "Gateway session ended");
                    failures = failures.saturating_add(1);
                }
            }
            self.state.set_ready(false);

            let delay = exponential_delay(failures);
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Gateway stopped");
        Ok(())
    }

    async fn session(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, GatewayError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();
        debug!(url = %self.url, "Gateway connected");

        let hello = loop {
            match stream.next().await {
                Some(Ok(Frame::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    if payload.op != opcode::HELLO {
                        return Err(GatewayError::Protocol(format!(
                            "expected HELLO, got op {}",
                            payload.op
                        )));
                    }
                    break serde_json::from_value::<Hello>(payload.d)?;
                }
                Some(Ok(Frame::Close(frame))) => return Err(closed(frame)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(GatewayError::Closed("before HELLO".to_string())),
            }
        };

        sink.send(Frame::Text(identify_payload(&self.token).to_string()))
            .await?;

        let interval = Duration::from_millis(hello.heartbeat_interval);
        let jitter: f64 = rand::rng().random();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval.mul_f64(jitter), interval);
        let mut seq: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        if let Err(e) = sink.send(Frame::Close(None)).await {
                            debug!(error = %e, "Failed to close gateway socket");
                        }
                        return Ok(SessionEnd::Shutdown);
                    }
                }

                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("Heartbeat not acknowledged, reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    acked = false;
                    sink.send(Frame::Text(heartbeat_payload(seq).to_string())).await?;
                }

                frame = stream.next() => {
                    let Some(frame) = frame else {
                        return Err(GatewayError::Closed("stream ended".to_string()));
                    };
                    match frame? {
                        Frame::Text(text) => {
                            let payload: GatewayPayload = serde_json::from_str(&text)?;
                            if payload.s.is_some() {
                                seq = payload.s;
                            }
                            match payload.op {
                                opcode::DISPATCH => self.dispatch(payload.t.as_deref(), payload.d),
                                opcode::HEARTBEAT => {
                                    sink.send(Frame::Text(heartbeat_payload(seq).to_string())).await?;
                                }
                                opcode::HEARTBEAT_ACK => acked = true,
                                opcode::RECONNECT => return Ok(SessionEnd::Reconnect),
                                opcode::INVALID_SESSION => {
                                    warn!("Gateway session invalidated");
                                    return Ok(SessionEnd::Reconnect);
                                }
                                other => debug!(op = other, "Ignoring gateway opcode"),
                            }
                        }
                        Frame::Close(frame) => return Err(closed(frame)),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Hand a dispatch event to the bot on its own task so the read loop
    /// keeps up with heartbeats.
    fn dispatch(&self, event: Option<&str>, data: Value) {
        let bot = self.bot.clone();
        match event {
            Some("READY") => match serde_json::from_value::<Ready>(data) {
                Ok(ready) => {
                    tokio::spawn(async move { bot.on_ready(ready).await });
                }
                Err(e) => warn!(error = %e, "Malformed READY"),
            },
            Some("INTERACTION_CREATE") => match serde_json::from_value::<Interaction>(data) {
                Ok(interaction) => {
                    tokio::spawn(async move { bot.on_interaction(interaction).await });
                }
                Err(e) => warn!(error = %e, "Malformed INTERACTION_CREATE"),
            },
            Some("MESSAGE_CREATE") => match serde_json::from_value::<Message>(data) {
                Ok(message) => {
                    tokio::spawn(async move { bot.on_message(message).await });
                }
                Err(e) => debug!(error = %e, "Malformed MESSAGE_CREATE"),
            },
            _ => {}
        }
    }
}

fn closed(frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame<'_>>) -> GatewayError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.to_string();
            if is_fatal_close(code) {
                GatewayError::Rejected { code, reason }
            } else {
                GatewayError::Closed(format!("code {code}: {reason}"))
            }
        }
        None => GatewayError::Closed("no close frame".to_string()),
    }
}
