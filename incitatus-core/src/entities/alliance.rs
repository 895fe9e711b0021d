use incitatus_sdk::objects::AllianceDocument;
use std::collections::HashSet;

/// In-game guild ids whose players may register.
///
/// Loaded once from the alliance document and never written back.
#[derive(Debug, Clone, Default)]
pub struct AllianceWhitelist {
    guild_ids: HashSet<String>,
}

impl AllianceWhitelist {
    pub fn from_document(document: &AllianceDocument) -> Self {
        Self {
            guild_ids: document.guild_ids().map(str::to_owned).collect(),
        }
    }

    pub fn contains(&self, guild_id: &str) -> bool {
        self.guild_ids.contains(guild_id)
    }

    pub fn len(&self) -> usize {
        self.guild_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guild_ids.is_empty()
    }
}
