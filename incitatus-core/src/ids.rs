//! Snowflake identifiers of the chat platform.
//!
//! Each id kind gets its own newtype so a channel id can never be passed
//! where a message id is expected. They serialize as bare integers, and as
//! strings when used as JSON object keys.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake!(
    /// A member of the chat server.
    UserId
);
snowflake!(ChannelId);
snowflake!(MessageId);
snowflake!(
    /// The chat server (not to be confused with the in-game guild).
    GuildId
);
snowflake!(RoleId);
