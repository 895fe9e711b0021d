use serde::{Deserialize, Serialize};

/// Alliance document as returned by `GET alliances/{id}`.
///
/// The bot stores a copy of it on disk and only reads the member guild
/// ids, which form the registration whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllianceDocument {
    #[serde(default)]
    pub guilds: Vec<AllianceGuild>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllianceGuild {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl AllianceDocument {
    pub fn guild_ids(&self) -> impl Iterator<Item = &str> {
        self.guilds.iter().map(|g| g.id.as_str())
    }
}
