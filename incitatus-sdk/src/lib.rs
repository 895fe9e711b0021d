//! Albion Online game-info API objects and client.
//!
//! The objects mirror the JSON returned by the public game-info endpoints
//! closely enough to round-trip the fields the bot reads. The HTTP client
//! lives behind the `client` feature.

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
