//! Validated sync settings and the shared enable flags.
//!
//! [`SyncSettings`] holds the string settings, fixed for the lifetime of
//! the engine. The two enable flags live in [`SyncFlags`] because operator
//! commands flip them from a different task than the one running ticks.
//!
//! Validation runs on every tick. A failed check disables the feature and
//! broadcasts an error, so a known-broken sync is never retried until an
//! operator toggles it back on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::config::SyncConfig;
use crate::environment::{MessageSink, tagged};

/// Placeholder API key shipped in the default config.
pub const API_KEY_PLACEHOLDER: &str = "API_KEY";

/// A synchronized facet of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Clock synchronization.
    Time,
    /// Weather synchronization.
    Weather,
}

impl Feature {
    /// Human-readable name used in operator messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Time => "Sync Time",
            Self::Weather => "Sync Weather",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// String settings required by the two sync features.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncSettings {
    /// IANA timezone identifier.
    pub timezone_id: String,
    /// Weather provider API key.
    pub api_key: String,
    /// Weather provider location query.
    pub location: String,
}

impl SyncSettings {
    /// Build settings from an (already overridden) config document.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            timezone_id: config.timezone.clone(),
            api_key: config.api_key.clone(),
            location: config.location.clone(),
        }
    }

    /// Whether time sync preconditions hold.
    pub fn time_ready(&self) -> bool {
        !self.timezone_id.is_empty()
    }

    /// Whether weather sync preconditions hold.
    pub fn weather_ready(&self) -> bool {
        !self.api_key.is_empty()
            && !self.api_key.eq_ignore_ascii_case(API_KEY_PLACEHOLDER)
            && !self.location.is_empty()
    }
}

/// Enable flags shared between the scheduler and operator commands.
#[derive(Debug)]
pub struct SyncFlags {
    time_enabled: AtomicBool,
    weather_enabled: AtomicBool,
}

impl SyncFlags {
    /// Create flags with the given initial states.
    pub const fn new(time_enabled: bool, weather_enabled: bool) -> Self {
        Self {
            time_enabled: AtomicBool::new(time_enabled),
            weather_enabled: AtomicBool::new(weather_enabled),
        }
    }

    /// Create flags from the `SyncTime` / `SyncWeather` config values.
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.sync_time, config.sync_weather)
    }

    const fn flag(&self, feature: Feature) -> &AtomicBool {
        match feature {
            Feature::Time => &self.time_enabled,
            Feature::Weather => &self.weather_enabled,
        }
    }

    /// Check whether a feature is enabled.
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.flag(feature).load(Ordering::Acquire)
    }

    /// Set a feature's enabled state.
    pub fn set_enabled(&self, feature: Feature, enabled: bool) {
        self.flag(feature).store(enabled, Ordering::Release);
    }

    /// Flip a feature's enabled state and return the new state.
    ///
    /// Preconditions are not checked here; the next tick validates and
    /// disables the feature again if its settings are unusable.
    pub fn toggle(&self, feature: Feature) -> bool {
        let previous = self.flag(feature).fetch_xor(true, Ordering::AcqRel);
        !previous
    }

    /// Snapshot of `(time_enabled, weather_enabled)`.
    pub fn snapshot(&self) -> (bool, bool) {
        (
            self.is_enabled(Feature::Time),
            self.is_enabled(Feature::Weather),
        )
    }
}

/// Check time sync settings, disabling the feature on failure.
///
/// Returns `true` iff the timezone is non-empty.
pub fn validate_time_config(
    settings: &SyncSettings,
    flags: &SyncFlags,
    sink: &dyn MessageSink,
) -> bool {
    if settings.time_ready() {
        return true;
    }
    disable_with_error(Feature::Time, flags, sink);
    false
}

/// Check weather sync settings, disabling the feature on failure.
///
/// Returns `true` iff the API key is set and not the placeholder, and the
/// location is set.
pub fn validate_weather_config(
    settings: &SyncSettings,
    flags: &SyncFlags,
    sink: &dyn MessageSink,
) -> bool {
    if settings.weather_ready() {
        return true;
    }
    disable_with_error(Feature::Weather, flags, sink);
    false
}

fn disable_with_error(feature: Feature, flags: &SyncFlags, sink: &dyn MessageSink) {
    flags.set_enabled(feature, false);
    let message = missing_config_message(feature);
    warn!(feature = %feature, "missing config values, feature disabled");
    sink.broadcast(&message);
}

/// Operator-facing error text for a feature with missing settings.
pub fn missing_config_message(feature: Feature) -> String {
    tagged(&format!(
        "ERROR: Missing config values for {feature}, disabling. \
         To fix, verify the config has been setup and reload"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::RecordingSink;

    fn weather_settings(api_key: &str, location: &str) -> SyncSettings {
        SyncSettings {
            timezone_id: "UTC".to_owned(),
            api_key: api_key.to_owned(),
            location: location.to_owned(),
        }
    }

    #[test]
    fn empty_timezone_fails_and_disables() {
        let settings = SyncSettings::default();
        let flags = SyncFlags::new(true, true);
        let sink = RecordingSink::default();

        assert!(!validate_time_config(&settings, &flags, &sink));
        assert!(!flags.is_enabled(Feature::Time));
        assert!(flags.is_enabled(Feature::Weather));

        // A second call stays false and keeps the flag off.
        assert!(!validate_time_config(&settings, &flags, &sink));
        assert!(!flags.is_enabled(Feature::Time));

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.contains("Sync Time")));
    }

    #[test]
    fn valid_timezone_passes_silently() {
        let settings = weather_settings("", "");
        let flags = SyncFlags::new(true, false);
        let sink = RecordingSink::default();

        assert!(validate_time_config(&settings, &flags, &sink));
        assert!(flags.is_enabled(Feature::Time));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn weather_rejects_missing_or_placeholder_values() {
        let cases = [
            ("", "DesMoines,US"),
            ("API_KEY", "DesMoines,US"),
            ("api_key", "DesMoines,US"),
            ("Api_Key", "DesMoines,US"),
            ("abc123", ""),
        ];
        for (api_key, location) in cases {
            let flags = SyncFlags::new(false, true);
            let sink = RecordingSink::default();
            let ok = validate_weather_config(&weather_settings(api_key, location), &flags, &sink);
            assert!(!ok, "expected rejection for key={api_key:?} location={location:?}");
            assert!(!flags.is_enabled(Feature::Weather));
            assert_eq!(sink.messages().len(), 1);
        }
    }

    #[test]
    fn weather_accepts_real_values() {
        let flags = SyncFlags::new(false, true);
        let sink = RecordingSink::default();
        let settings = weather_settings("abc123", "DesMoines,US");

        assert!(validate_weather_config(&settings, &flags, &sink));
        assert!(flags.is_enabled(Feature::Weather));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn toggle_flips_and_reports_new_state() {
        let flags = SyncFlags::new(false, true);
        assert!(flags.toggle(Feature::Time));
        assert!(flags.is_enabled(Feature::Time));
        assert!(!flags.toggle(Feature::Time));
        assert!(!flags.toggle(Feature::Weather));
        assert_eq!(flags.snapshot(), (false, false));
    }

    #[test]
    fn missing_config_message_is_tagged() {
        let message = missing_config_message(Feature::Weather);
        assert!(message.starts_with(crate::environment::CHAT_TAG));
        assert!(message.contains("Sync Weather"));
    }
}
