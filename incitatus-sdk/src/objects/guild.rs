use serde::{Deserialize, Serialize};

/// One entry of `GET guilds/{id}/members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GuildMember {
    pub name: String,
    #[serde(default)]
    pub kill_fame: u64,
    #[serde(default)]
    pub lifetime_statistics: LifetimeStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStatistics {
    #[serde(rename = "PvE", default)]
    pub pve: FameTotal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FameTotal {
    #[serde(default)]
    pub total: u64,
}

impl GuildMember {
    /// Kill fame, shown as PvP fame.
    pub fn pvp_fame(&self) -> u64 {
        self.kill_fame
    }

    /// Lifetime PvE fame total.
    pub fn pve_fame(&self) -> u64 {
        self.lifetime_statistics.pve.total
    }

    pub fn total_fame(&self) -> u64 {
        self.pvp_fame().saturating_add(self.pve_fame())
    }
}
