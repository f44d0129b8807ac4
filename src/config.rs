//! Application-level configuration loading: JSON file, then environment overrides.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SUBATHON_TIMER_CONFIG_PATH";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SNAPSHOT_PATH: &str = "data/timer-state.json";
const DEFAULT_STREAMLABS_URL: &str = "wss://sockets.streamlabs.com";

/// Reasons a configuration file was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file")]
    Read(#[from] std::io::Error),
    /// The file is not valid JSON for [`AppConfig`].
    #[error("failed to parse config file")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Connection settings of the Streamlabs alert socket.
pub struct StreamlabsConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub port: u16,
    pub snapshot_path: PathBuf,
    /// `None` disables the alert socket client.
    pub streamlabs: Option<StreamlabsConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl AppConfig {
    /// Load the configuration file, falling back to defaults, then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let raw = match read_config(&path) {
            Ok(raw) => {
                info!(path = %path.display(), "loaded config file");
                raw
            }
            Err(ConfigError::Read(err)) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found; using built-in defaults");
                RawConfig::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load config; falling back to defaults"
                );
                RawConfig::default()
            }
        };
        raw.with_overrides(|name| env::var(name).ok()).into()
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn read_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let raw: RawConfig = serde_json::from_str(&contents)?;
    raw.validate()?;
    Ok(raw)
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[validate(range(min = 1))]
    port: Option<u16>,
    #[validate(length(min = 1))]
    snapshot_path: Option<String>,
    #[validate(url)]
    streamlabs_url: Option<String>,
    streamlabs_token: Option<String>,
}

impl RawConfig {
    /// Environment values win over the file; unparsable or empty ones are ignored.
    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) if port > 0 => self.port = Some(port),
                _ => warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        if let Some(path) = lookup("SNAPSHOT_PATH") {
            self.snapshot_path = Some(path);
        }
        if let Some(url) = lookup("STREAMLABS_URL") {
            self.streamlabs_url = Some(url);
        }
        if let Some(token) = lookup("STREAMLABS_TOKEN") {
            self.streamlabs_token = Some(token);
        }
        self
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let streamlabs = raw
            .streamlabs_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(|token| StreamlabsConfig {
                url: raw
                    .streamlabs_url
                    .unwrap_or_else(|| DEFAULT_STREAMLABS_URL.to_string()),
                token,
            });
        Self {
            port: raw.port.unwrap_or(DEFAULT_PORT),
            snapshot_path: PathBuf::from(
                raw.snapshot_path
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
            ),
            streamlabs,
        }
    }
}
