use serde::{Deserialize, Serialize};

/// Response of `GET search?q=...`.
///
/// The endpoint also returns matching guilds; only players are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSearchResponse {
    #[serde(default)]
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerSummary {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub guild_name: Option<String>,
    #[serde(default)]
    pub alliance_id: Option<String>,
}

impl PlayerSearchResponse {
    /// Pick the candidate whose name equals `name`, ignoring case.
    ///
    /// The search endpoint matches on prefixes, so the first hit is not
    /// necessarily the player that was asked for.
    pub fn exact_match(self, name: &str) -> Option<PlayerSummary> {
        let wanted = name.to_lowercase();
        self.players
            .into_iter()
            .find(|p| p.name.to_lowercase() == wanted)
    }
}

impl PlayerSummary {
    /// Guild id, treating the empty string the API uses for guildless
    /// players as absent.
    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn guild_name(&self) -> Option<&str> {
        self.guild_name.as_deref().filter(|name| !name.is_empty())
    }
}
