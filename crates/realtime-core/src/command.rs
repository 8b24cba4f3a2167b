//! Operator commands.
//!
//! `synctime` and `syncweather` flip the matching enable flag and persist
//! the change right away. They never validate settings: turning a feature
//! on with bad settings is allowed, and the next tick switches it back off
//! with an error broadcast.

use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::environment::tagged;
use crate::settings::{Feature, SyncFlags};

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Flip a feature's enable flag.
    Toggle(Feature),
    /// Report both enable flags.
    Status,
    /// Shut the engine down.
    Stop,
}

impl OperatorCommand {
    /// Parse a command line. Case-insensitive; a leading `/` is allowed.
    pub fn parse(input: &str) -> Option<Self> {
        let word = input.trim().trim_start_matches('/').to_ascii_lowercase();
        match word.as_str() {
            "synctime" => Some(Self::Toggle(Feature::Time)),
            "syncweather" => Some(Self::Toggle(Feature::Weather)),
            "syncstatus" => Some(Self::Status),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Text for an enabled state.
pub const fn state_label(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

/// Flip `feature`, persist both flags, and return the operator reply.
pub async fn toggle_feature(feature: Feature, flags: &SyncFlags, store: &ConfigStore) -> String {
    let enabled = flags.toggle(feature);
    let (time_enabled, weather_enabled) = flags.snapshot();
    if let Err(e) = store.persist_flags(time_enabled, weather_enabled).await {
        warn!(feature = %feature, error = %e, "failed to persist toggled flag");
    }
    info!(feature = %feature, enabled, "feature toggled by operator");
    tagged(&format!("{feature} is now {}", state_label(enabled)))
}

/// Reply describing both features.
pub fn status_message(flags: &SyncFlags) -> String {
    let (time_enabled, weather_enabled) = flags.snapshot();
    tagged(&format!(
        "{} is {}, {} is {}",
        Feature::Time,
        state_label(time_enabled),
        Feature::Weather,
        state_label(weather_enabled),
    ))
}

/// Execute a command and return the operator reply.
pub async fn execute_command(
    command: OperatorCommand,
    flags: &SyncFlags,
    store: &ConfigStore,
) -> String {
    match command {
        OperatorCommand::Toggle(feature) => toggle_feature(feature, flags, store).await,
        OperatorCommand::Status => status_message(flags),
        OperatorCommand::Stop => tagged("Stopping..."),
    }
}
