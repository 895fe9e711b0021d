//! TOML file settings structures.
//!
//! These structs directly map to the `incitatus.toml` file format. Every
//! section and key is optional.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root settings structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub game_data: GameDataSection,
    pub roster: RosterSection,
    pub cleanup: CleanupSection,
    pub roles: RolesSection,
    pub discord: DiscordSection,
}

/// Liveness endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 10000)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the six JSON documents.
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameDataSection {
    pub base_url: String,
    /// In-game guild whose roster is tracked.
    pub guild_id: String,
    pub roster_timeout_secs: u64,
    pub search_timeout_secs: u64,
}

impl Default for GameDataSection {
    fn default() -> Self {
        Self {
            base_url: "https://gameinfo.albiononline.com/api/gameinfo/".to_string(),
            guild_id: "29kSNYdrTv2iSPH0uHjbpQ".to_string(),
            roster_timeout_secs: 10,
            search_timeout_secs: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterSection {
    pub period_secs: u64,
}

impl Default for RosterSection {
    fn default() -> Self {
        Self { period_secs: 1800 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub delay_secs: u64,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self { delay_secs: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesSection {
    /// Role name granting administrative rights.
    pub admin: String,
    /// Role name marking registered members.
    pub registered: String,
}

impl Default for RolesSection {
    fn default() -> Self {
        Self {
            admin: "senate".to_string(),
            registered: "Plebs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSection {
    /// Server to operate in. When absent, the first server the bot is a
    /// member of is used.
    pub guild_id: Option<u64>,
    pub api_base: String,
    pub gateway_url: String,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            guild_id: None,
            api_base: "https://discord.com/api/v10/".to_string(),
            gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
        }
    }
}
