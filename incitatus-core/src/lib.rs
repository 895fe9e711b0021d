#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod entities;
pub mod framework;
pub mod game_data;
pub mod ids;
pub mod platform;
pub mod processors;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use context::BotContext;
