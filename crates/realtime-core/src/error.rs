//! Top-level error type for the sync core.
//!
//! Most failures are handled inside a tick and never escape it: invalid
//! settings disable the feature, weather fetch failures are logged and
//! skipped. [`SyncError`] covers what callers must see, mainly startup.

use crate::config::ConfigError;
use crate::weather::WeatherError;

/// Errors surfaced by the sync core.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The configured world is not hosted by this process.
    #[error("world '{name}' not found (available: {known:?})")]
    EnvironmentUnavailable {
        /// The requested world name.
        name: String,
        /// Names of the worlds that are available.
        known: Vec<String>,
    },

    /// Configuration could not be loaded or saved.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The weather client could not be built.
    #[error("weather client error: {source}")]
    Weather {
        /// The underlying weather error.
        #[from]
        source: WeatherError,
    },
}
