//! Wire objects of the game-info API.
//!
//! Field names follow the upstream PascalCase JSON. Unknown fields are
//! ignored, and every numeric statistic defaults to zero so that partial
//! records from the API never fail the whole roster.

pub mod alliance;
pub mod guild;
pub mod player;

pub use alliance::{AllianceDocument, AllianceGuild};
pub use guild::{FameTotal, GuildMember, LifetimeStatistics};
pub use player::{PlayerSearchResponse, PlayerSummary};
