use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{RelayMode, RelayTarget};

pub const DEFAULT_SOURCE_API: &str = "https://slack.com/api";
/// Source platform tier limit for history and profile calls.
pub const DEFAULT_CALLS_PER_MINUTE: u32 = 50;
pub const ENV_PREFIX: &str = "RELAY_";

/// Top-level config (relay.toml + RELAY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Channel to ingest from.
    pub channel: String,
    /// Bearer token for the source API.
    pub token: String,
    #[serde(default = "default_api")]
    pub api: String,
    /// Maximum source API calls per minute.
    #[serde(default = "default_rpm")]
    pub rpm: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub target: RelayTarget,
    #[serde(default)]
    pub mode: RelayMode,
    /// Destination webhook URL. Required whenever relay is active.
    pub webhook: Option<String>,
}

impl RelaySettings {
    /// True when records will actually be forwarded this run.
    pub fn is_active(&self) -> bool {
        self.target != RelayTarget::None && self.mode != RelayMode::Off
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_api() -> String {
    DEFAULT_SOURCE_API.to_string()
}
fn default_rpm() -> u32 {
    DEFAULT_CALLS_PER_MINUTE
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.db", home)
}

impl RelayConfig {
    /// Load config from a TOML file with RELAY_* env var overrides.
    ///
    /// A missing file is not an error; the environment alone can carry
    /// every option (`RELAY_SOURCE_CHANNEL`, `RELAY_RELAY_TARGET`, ...).
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed(ENV_PREFIX).split("_")),
        )
    }

    /// Extract and validate from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: RelayConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.channel.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "source.channel",
                reason: "must not be empty".to_string(),
            });
        }
        if self.source.token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "source.token",
                reason: "must not be empty".to_string(),
            });
        }
        if self.source.rpm == 0 {
            return Err(ConfigError::Invalid {
                field: "source.rpm",
                reason: "must be at least 1".to_string(),
            });
        }
        let has_webhook = self
            .relay
            .webhook
            .as_deref()
            .is_some_and(|w| !w.trim().is_empty());
        if self.relay.is_active() && !has_webhook {
            return Err(ConfigError::Invalid {
                field: "relay.webhook",
                reason: format!(
                    "required for target '{}' in mode '{}'",
                    self.relay.target, self.relay.mode
                ),
            });
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.toml", home)
}
