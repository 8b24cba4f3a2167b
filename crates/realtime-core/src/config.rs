//! Persisted configuration for the sync engine.
//!
//! The configuration lives in a flat YAML file (default
//! `realtime-config.yaml`) whose keys match the host's historical layout:
//! `World`, `Timezone`, `APIKey`, `Location`, `SyncTime`, `SyncWeather`,
//! plus a handful of engine tunables. Missing keys take defaults, and a
//! missing file is created with the defaults on first load.
//!
//! [`ConfigStore`] owns the on-disk document. Only the two enable flags
//! are ever written back; values injected through environment overrides
//! apply to the running process and never reach the disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::weather::StormRule;

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "realtime-config.yaml";

/// Environment variable overriding `Timezone`.
pub const ENV_TIMEZONE: &str = "REALTIME_TIMEZONE";

/// Environment variable overriding `APIKey`.
pub const ENV_API_KEY: &str = "REALTIME_API_KEY";

/// Environment variable overriding `Location`.
pub const ENV_LOCATION: &str = "REALTIME_LOCATION";

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file.
    #[error("config file I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse or render YAML content.
    #[error("config YAML error: {source}")]
    Yaml {
        /// The underlying YAML error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// The full persisted configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncConfig {
    /// Name of the world whose clock and weather are synchronized.
    #[serde(default = "default_world")]
    pub world: String,

    /// IANA timezone identifier used for time sync (e.g. `America/Chicago`).
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Weather provider API key.
    #[serde(rename = "APIKey", default = "default_api_key")]
    pub api_key: String,

    /// Weather provider location query (e.g. `DesMoines,US`).
    #[serde(default)]
    pub location: String,

    /// Whether time sync is enabled.
    #[serde(default = "default_true")]
    pub sync_time: bool,

    /// Whether weather sync is enabled.
    #[serde(default)]
    pub sync_weather: bool,

    /// Wall-clock milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Weather sync runs on every Nth tick.
    #[serde(default = "default_weather_every_ticks")]
    pub weather_every_ticks: u64,

    /// Base URL of the weather provider; `/weather` is appended.
    #[serde(default = "default_weather_endpoint")]
    pub weather_endpoint: String,

    /// Upper bound on a single weather request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How provider condition text is reduced to the storm flag.
    #[serde(default)]
    pub storm_rule: StormRule,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            world: default_world(),
            timezone: default_timezone(),
            api_key: default_api_key(),
            location: String::new(),
            sync_time: true,
            sync_weather: false,
            tick_interval_ms: default_tick_interval_ms(),
            weather_every_ticks: default_weather_every_ticks(),
            weather_endpoint: default_weather_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            storm_rule: StormRule::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string. Empty input yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Render the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Apply process environment overrides:
    /// - `REALTIME_TIMEZONE` overrides `Timezone`
    /// - `REALTIME_API_KEY` overrides `APIKey`
    /// - `REALTIME_LOCATION` overrides `Location`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |key: &str| lookup(key).filter(|value| !value.is_empty());
        if let Some(timezone) = fetch(ENV_TIMEZONE) {
            self.timezone = timezone;
        }
        if let Some(api_key) = fetch(ENV_API_KEY) {
            self.api_key = api_key;
        }
        if let Some(location) = fetch(ENV_LOCATION) {
            self.location = location;
        }
    }
}

/// Owner of the persisted configuration document.
///
/// The document is guarded by an async mutex so the scheduler task and the
/// operator command task can both persist flag changes.
#[derive(Debug)]
pub struct ConfigStore {
    /// Backing file, or `None` for a store that never touches disk.
    path: Option<PathBuf>,
    /// The document as it exists on disk (no environment overrides).
    document: Mutex<SyncConfig>,
}

impl ConfigStore {
    /// Open the config file at `path`, creating it with defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if the default file cannot be written.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document = if path.exists() {
            let config = SyncConfig::from_file(path)?;
            debug!(path = %path.display(), "config file loaded");
            config
        } else {
            let config = SyncConfig::default();
            std::fs::write(path, config.to_yaml()?)?;
            info!(path = %path.display(), "config file not found, wrote defaults");
            config
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            document: Mutex::new(document),
        })
    }

    /// Create a store that keeps the document in memory only.
    pub fn in_memory(document: SyncConfig) -> Self {
        Self {
            path: None,
            document: Mutex::new(document),
        }
    }

    /// Return a copy of the persisted document.
    pub async fn document(&self) -> SyncConfig {
        self.document.lock().await.clone()
    }

    /// Return the document with process environment overrides applied.
    pub async fn effective(&self) -> SyncConfig {
        let mut config = self.document().await;
        config.apply_env_overrides();
        config
    }

    /// Record the current enable flags, writing the file only if they changed.
    ///
    /// Returns `true` when the document was modified.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file write fails. The document is
    /// only updated after a successful write, so the next call retries.
    pub async fn persist_flags(
        &self,
        sync_time: bool,
        sync_weather: bool,
    ) -> Result<bool, ConfigError> {
        let mut document = self.document.lock().await;
        if document.sync_time == sync_time && document.sync_weather == sync_weather {
            return Ok(false);
        }
        let updated = SyncConfig {
            sync_time,
            sync_weather,
            ..document.clone()
        };
        self.write(&updated).await?;
        *document = updated;
        debug!(sync_time, sync_weather, "enable flags persisted");
        Ok(true)
    }

    /// Unconditionally write the current document to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if rendering or the write fails.
    pub async fn save(&self) -> Result<(), ConfigError> {
        let document = self.document.lock().await;
        self.write(&document).await
    }

    async fn write(&self, document: &SyncConfig) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            tokio::fs::write(path, document.to_yaml()?).await?;
        }
        Ok(())
    }
}

fn default_world() -> String {
    "world".to_owned()
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_api_key() -> String {
    crate::settings::API_KEY_PLACEHOLDER.to_owned()
}

const fn default_true() -> bool {
    true
}

const fn default_tick_interval_ms() -> u64 {
    60_000
}

const fn default_weather_every_ticks() -> u64 {
    2
}

fn default_weather_endpoint() -> String {
    "http://api.openweathermap.org/data/2.5".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}
