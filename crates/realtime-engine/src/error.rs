//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or saving failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: realtime_core::config::ConfigError,
    },

    /// The sync core could not be set up (unknown world, bad client).
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: realtime_core::error::SyncError,
    },
}
