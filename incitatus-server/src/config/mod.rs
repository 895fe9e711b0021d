//! Settings module for incitatus-server.
//!
//! Handles loading the static settings from an optional TOML file, CLI
//! arguments, and environment variables.

pub mod file;

use crate::config::file::FileSettings;
use incitatus_core::config::BotSettings;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during settings loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid url for {field}: {source}")]
    UrlError {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DISCORD_TOKEN environment variable not set")]
    MissingToken,
}

/// Game-info API connection settings.
#[derive(Debug, Clone)]
pub struct GameDataSettings {
    pub base_url: Url,
    pub guild_id: String,
    pub roster_timeout: Duration,
    pub search_timeout: Duration,
}

/// Chat platform connection settings.
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub guild_id: Option<u64>,
    pub api_base: Url,
    pub gateway_url: Url,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub game_data: GameDataSettings,
    pub discord: DiscordSettings,
    pub bot: BotSettings,
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub data_dir: Option<PathBuf>,
    /// Port from the `PORT` environment variable.
    pub port: Option<u16>,
}

/// Settings loader that handles the complete loading process.
pub struct ConfigLoader {
    settings_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(settings_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            settings_path: settings_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and resolve the settings.
    ///
    /// This will:
    /// 1. Read the TOML file, or fall back to defaults when it is absent
    /// 2. Apply CLI and environment overrides
    /// 3. Validate and build the resolved settings
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut file_settings = match std::fs::read_to_string(&self.settings_path) {
            Ok(content) => toml::from_str::<FileSettings>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.settings_path.display(),
                    "Settings file not found, using defaults"
                );
                FileSettings::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(listen) = self.overrides.listen {
            file_settings.server.listen = listen;
        }
        if let Some(port) = self.overrides.port {
            file_settings.server.listen.set_port(port);
        }
        if let Some(data_dir) = &self.overrides.data_dir {
            file_settings.storage.data_dir = data_dir.clone();
        }

        self.validate(&file_settings)?;
        build_settings(file_settings)
    }

    fn validate(&self, settings: &FileSettings) -> Result<(), ConfigError> {
        if settings.roster.period_secs == 0 {
            return Err(ConfigError::ValidationError(
                "roster.period_secs must be positive".to_string(),
            ));
        }
        if settings.game_data.guild_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "game_data.guild_id must not be empty".to_string(),
            ));
        }
        if settings.roles.registered.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "roles.registered must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::UrlError { field, source })
}

fn build_settings(file: FileSettings) -> Result<Settings, ConfigError> {
    let bot = BotSettings {
        admin_role: file.roles.admin,
        registered_role: file.roles.registered,
        roster_period: Duration::from_secs(file.roster.period_secs),
        cleanup_delay: Duration::from_secs(file.cleanup.delay_secs),
        ..BotSettings::default()
    };

    Ok(Settings {
        listen: file.server.listen,
        data_dir: file.storage.data_dir,
        game_data: GameDataSettings {
            base_url: parse_url("game_data.base_url", &file.game_data.base_url)?,
            guild_id: file.game_data.guild_id,
            roster_timeout: Duration::from_secs(file.game_data.roster_timeout_secs),
            search_timeout: Duration::from_secs(file.game_data.search_timeout_secs),
        },
        discord: DiscordSettings {
            guild_id: file.discord.guild_id,
            api_base: parse_url("discord.api_base", &file.discord.api_base)?,
            gateway_url: parse_url("discord.gateway_url", &file.discord.gateway_url)?,
        },
        bot,
    })
}

/// Get the bot token from the environment.
pub fn get_discord_token() -> Result<String, ConfigError> {
    std::env::var("DISCORD_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or(ConfigError::MissingToken)
}

/// Read the `PORT` environment variable, ignoring unparsable values.
pub fn get_port_override() -> Option<u16> {
    let raw = std::env::var("PORT").ok()?;
    match raw.trim().parse() {
        Ok(port) => Some(port),
        Err(_) => {
            tracing::warn!(value = %raw, "Ignoring unparsable PORT");
            None
        }
    }
}
