//! The bot's behavior, one processor per concern.
//!
//! Each processor borrows the [`BotContext`](crate::BotContext) and is
//! cheap to construct per call.

pub mod cleanup;
pub mod event_machine;
pub mod loot_split;
pub mod registration;
pub mod roster_sync;
pub mod surfaces;
pub mod treasury;
