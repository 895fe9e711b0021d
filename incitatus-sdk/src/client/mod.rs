//! HTTP client for the game-info API.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use url::Url;

use crate::objects::{GuildMember, PlayerSearchResponse, PlayerSummary};

/// Errors produced by [`GameDataClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::Json(_) | ClientError::Url(_) => false,
        }
    }
}

/// Typed client for the two endpoints the bot uses: the guild roster and
/// the player search.
#[derive(Debug, Clone)]
pub struct GameDataClient {
    http: Client,
    base_url: Url,
    guild_id: String,
    roster_timeout: Duration,
    search_timeout: Duration,
}

impl GameDataClient {
    pub const DEFAULT_BASE_URL: &str = "https://gameinfo.albiononline.com/api/gameinfo/";
    pub const DEFAULT_ROSTER_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(8);

    /// Create a client for the guild `guild_id`.
    ///
    /// * `base_url` – API root, e.g. [`Self::DEFAULT_BASE_URL`]. A missing
    ///   trailing slash is added so that endpoint paths join below it.
    pub fn new(mut base_url: Url, guild_id: impl Into<String>) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: Client::new(),
            base_url,
            guild_id: guild_id.into(),
            roster_timeout: Self::DEFAULT_ROSTER_TIMEOUT,
            search_timeout: Self::DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// Override the per-request timeouts.
    pub fn with_timeouts(mut self, roster: Duration, search: Duration) -> Self {
        self.roster_timeout = roster;
        self.search_timeout = search;
        self
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// `GET guilds/{guild_id}/members` – the full current roster.
    pub async fn guild_members(&self) -> Result<Vec<GuildMember>, ClientError> {
        let url = self.base_url.join(&format!(
            "guilds/{}/members",
            urlencoding::encode(&self.guild_id)
        ))?;

        let resp = self
            .http
            .get(url)
            .timeout(self.roster_timeout)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `GET search?q={query}` – players and guilds whose name starts with
    /// `query`.
    pub async fn search(&self, query: &str) -> Result<PlayerSearchResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("search?q={}", urlencoding::encode(query)))?;

        let resp = self
            .http
            .get(url)
            .timeout(self.search_timeout)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// Look up a player by exact name (case-insensitive).
    ///
    /// Returns `Ok(None)` when the search succeeded but no candidate has
    /// exactly that name.
    pub async fn find_player(&self, name: &str) -> Result<Option<PlayerSummary>, ClientError> {
        let found = self.search(name).await?.exact_match(name);
        tracing::debug!(query = name, found = found.is_some(), "player search finished");
        Ok(found)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
