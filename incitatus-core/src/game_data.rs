//! The seam in front of the external game-data API.

use async_trait::async_trait;
use incitatus_sdk::client::{ClientError, GameDataClient};
use incitatus_sdk::objects::{GuildMember, PlayerSummary};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameDataError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("game data unavailable: {0}")]
    Unavailable(String),
}

impl GameDataError {
    /// Whether asking again later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GameDataError::Client(e) => e.is_transient(),
            GameDataError::Unavailable(_) => true,
        }
    }
}

/// Read-only access to the guild roster and player directory.
#[async_trait]
pub trait GameDataSource: Send + Sync {
    /// Every member of the tracked guild.
    async fn guild_members(&self) -> Result<Vec<GuildMember>, GameDataError>;

    /// The player whose name equals `name` (ignoring case), if any.
    async fn find_player(&self, name: &str) -> Result<Option<PlayerSummary>, GameDataError>;
}

#[async_trait]
impl GameDataSource for GameDataClient {
    async fn guild_members(&self) -> Result<Vec<GuildMember>, GameDataError> {
        Ok(GameDataClient::guild_members(self).await?)
    }

    async fn find_player(&self, name: &str) -> Result<Option<PlayerSummary>, GameDataError> {
        Ok(GameDataClient::find_player(self, name).await?)
    }
}
