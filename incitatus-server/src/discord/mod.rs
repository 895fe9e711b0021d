//! Discord adapter: REST client, gateway session and wire model.

pub mod gateway;
pub mod model;
pub mod rest;

pub use gateway::{Gateway, GatewayError};
pub use rest::DiscordRest;
