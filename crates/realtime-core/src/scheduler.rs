//! The sync tick cycle and its run loop.
//!
//! Each tick runs, in order:
//!
//! 1. Advance the tick counter and every task cadence.
//! 2. Persist the current enable flags (no write if unchanged).
//! 3. If time sync is enabled and its settings validate, apply the clock.
//! 4. If weather sync is enabled, its settings validate, and its cadence
//!    fired, fetch conditions and apply the storm flag. A failed fetch is
//!    logged and skipped; the feature stays enabled.
//!
//! Ticks are strictly sequential: [`SyncScheduler::run`] awaits the whole
//! tick body, including the weather request, before waiting for the next
//! interval. A slow provider therefore delays the next clock update by at
//! most the client's request timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cadence::Cadence;
use crate::clock::sync_time;
use crate::config::{ConfigStore, SyncConfig};
use crate::environment::{Environment, MessageSink};
use crate::error::SyncError;
use crate::settings::{
    Feature, SyncFlags, SyncSettings, validate_time_config, validate_weather_config,
};
use crate::weather::{StormRule, WeatherClient};

/// Shortest accepted tick interval in milliseconds.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// What happened to weather sync during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherOutcome {
    /// Weather sync is switched off.
    Disabled,
    /// Settings failed validation; weather sync was switched off.
    Invalid,
    /// Enabled and valid, but this is not a weather tick.
    NotDue,
    /// Conditions were fetched and applied.
    Applied {
        /// Provider condition category.
        condition: String,
        /// Storm flag written to the world.
        stormy: bool,
    },
    /// The fetch failed; the world was left untouched.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Clock value applied to the world, if time sync ran.
    pub clock_value: Option<i64>,
    /// Weather sync result.
    pub weather: WeatherOutcome,
}

/// Drives clock and weather sync for one world.
pub struct SyncScheduler {
    settings: SyncSettings,
    flags: Arc<SyncFlags>,
    store: Arc<ConfigStore>,
    environment: Arc<dyn Environment>,
    sink: Arc<dyn MessageSink>,
    weather_client: WeatherClient,
    storm_rule: StormRule,
    time_cadence: Cadence,
    weather_cadence: Cadence,
    tick_interval: Duration,
    tick: u64,
}

impl SyncScheduler {
    /// Create a scheduler with default cadences (time every tick, weather
    /// every second tick), the legacy storm rule, and a 60 second interval.
    pub fn new(
        settings: SyncSettings,
        flags: Arc<SyncFlags>,
        store: Arc<ConfigStore>,
        environment: Arc<dyn Environment>,
        sink: Arc<dyn MessageSink>,
        weather_client: WeatherClient,
    ) -> Self {
        Self {
            settings,
            flags,
            store,
            environment,
            sink,
            weather_client,
            storm_rule: StormRule::Legacy,
            time_cadence: Cadence::always(),
            weather_cadence: Cadence::every_ticks(2),
            tick_interval: Duration::from_secs(60),
            tick: 0,
        }
    }

    /// Build a scheduler from an effective (overridden) config document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Weather`] if the weather client cannot be built.
    pub fn from_config(
        config: &SyncConfig,
        flags: Arc<SyncFlags>,
        store: Arc<ConfigStore>,
        environment: Arc<dyn Environment>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, SyncError> {
        let weather_client = WeatherClient::from_config(config)?;
        Ok(Self::new(
            SyncSettings::from_config(config),
            flags,
            store,
            environment,
            sink,
            weather_client,
        )
        .with_storm_rule(config.storm_rule)
        .with_weather_every(config.weather_every_ticks)
        .with_tick_interval(Duration::from_millis(config.tick_interval_ms)))
    }

    /// Use a different storm reduction rule.
    #[must_use]
    pub const fn with_storm_rule(mut self, rule: StormRule) -> Self {
        self.storm_rule = rule;
        self
    }

    /// Run weather sync on every `ticks`-th tick (zero is treated as one).
    #[must_use]
    pub fn with_weather_every(mut self, ticks: u64) -> Self {
        self.weather_cadence = Cadence::every_ticks(ticks);
        self
    }

    /// Set the wall-clock interval between ticks, clamped to
    /// [`MIN_TICK_INTERVAL_MS`].
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(MIN_TICK_INTERVAL_MS));
        self
    }

    /// Number of ticks run so far.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The interval between ticks.
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// The shared enable flags.
    pub const fn flags(&self) -> &Arc<SyncFlags> {
        &self.flags
    }

    /// Run one tick at the current wall-clock time.
    pub async fn run_tick(&mut self) -> TickReport {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one tick as if the real-world time were `now`.
    pub async fn run_tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick = self.tick.saturating_add(1);
        let time_due = self.time_cadence.tick();
        let weather_due = self.weather_cadence.tick();

        let (time_enabled, weather_enabled) = self.flags.snapshot();
        if let Err(e) = self.store.persist_flags(time_enabled, weather_enabled).await {
            warn!(tick = self.tick, error = %e, "failed to persist enable flags");
        }

        let clock_value = if self.flags.is_enabled(Feature::Time)
            && validate_time_config(&self.settings, &self.flags, self.sink.as_ref())
            && time_due
        {
            info!(tick = self.tick, "Updating Time...");
            Some(sync_time(&self.settings, self.environment.as_ref(), now))
        } else {
            None
        };

        let weather = self.sync_weather(weather_due).await;

        let report = TickReport {
            tick: self.tick,
            clock_value,
            weather,
        };
        debug!(
            tick = report.tick,
            clock_value = ?report.clock_value,
            weather = ?report.weather,
            "tick complete"
        );
        report
    }

    async fn sync_weather(&self, due: bool) -> WeatherOutcome {
        if !self.flags.is_enabled(Feature::Weather) {
            return WeatherOutcome::Disabled;
        }
        if !validate_weather_config(&self.settings, &self.flags, self.sink.as_ref()) {
            return WeatherOutcome::Invalid;
        }
        if !due {
            return WeatherOutcome::NotDue;
        }

        info!(tick = self.tick, location = self.settings.location, "Updating Weather...");
        match self
            .weather_client
            .fetch(&self.settings.location, &self.settings.api_key)
            .await
        {
            Ok(snapshot) => {
                let stormy = snapshot.is_stormy(self.storm_rule);
                self.environment.set_stormy(stormy);
                info!(
                    world = self.environment.name(),
                    condition = snapshot.condition,
                    description = ?snapshot.description,
                    temperature_f = ?snapshot.temperature_f,
                    rule = ?self.storm_rule,
                    stormy,
                    "Weather Updated!"
                );
                WeatherOutcome::Applied {
                    condition: snapshot.condition,
                    stormy,
                }
            }
            Err(e) => {
                warn!(
                    tick = self.tick,
                    error = %e,
                    "weather data failed to update, is your API key valid?"
                );
                WeatherOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Run ticks until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The first tick fires immediately. An in-flight tick always runs to
    /// completion before shutdown is observed. Returns the number of ticks
    /// run by this call.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let start_tick = self.tick;

        info!(
            world = self.environment.name(),
            tick_interval_ms = u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            weather_every_ticks = self.weather_cadence.period(),
            storm_rule = ?self.storm_rule,
            "sync scheduler starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.run_tick().await;
                }
            }
        }

        let ticks = self.tick.saturating_sub(start_tick);
        info!(ticks, "sync scheduler stopped");
        ticks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use chrono::TimeZone;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::environment::{RecordingSink, SimulatedWorld};

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogCapture {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
        }
    }

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct Harness {
        world: Arc<SimulatedWorld>,
        sink: Arc<RecordingSink>,
        flags: Arc<SyncFlags>,
        store: Arc<ConfigStore>,
    }

    fn harness(time_enabled: bool, weather_enabled: bool) -> Harness {
        let config = SyncConfig {
            sync_time: time_enabled,
            sync_weather: weather_enabled,
            ..SyncConfig::default()
        };
        Harness {
            world: Arc::new(SimulatedWorld::new("world")),
            sink: Arc::new(RecordingSink::default()),
            flags: Arc::new(SyncFlags::new(time_enabled, weather_enabled)),
            store: Arc::new(ConfigStore::in_memory(config)),
        }
    }

    fn build_scheduler(h: &Harness, settings: SyncSettings) -> SyncScheduler {
        // Port 9 (discard) on loopback: connections are refused quickly.
        let client =
            WeatherClient::new("http://127.0.0.1:9/data/2.5", Duration::from_millis(500)).unwrap();
        SyncScheduler::new(
            settings,
            Arc::clone(&h.flags),
            Arc::clone(&h.store),
            Arc::clone(&h.world) as Arc<dyn Environment>,
            Arc::clone(&h.sink) as Arc<dyn MessageSink>,
            client,
        )
    }

    fn chicago_settings() -> SyncSettings {
        SyncSettings {
            timezone_id: "America/Chicago".to_owned(),
            api_key: "abc123".to_owned(),
            location: "DesMoines,US".to_owned(),
        }
    }

    fn chicago_half_past_two() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 19, 30, 0)
            .single()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn time_sync_applies_clock() {
        let h = harness(true, false);
        let mut scheduler = build_scheduler(&h, chicago_settings());

        let report = scheduler.run_tick_at(chicago_half_past_two()).await;

        assert_eq!(report.tick, 1);
        assert_eq!(report.clock_value, Some(8480));
        assert_eq!(report.weather, WeatherOutcome::Disabled);
        assert_eq!(h.world.clock(), 8480);
    }

    #[tokio::test]
    async fn invalid_time_settings_disable_time() {
        let h = harness(true, false);
        let settings = SyncSettings {
            timezone_id: String::new(),
            ..chicago_settings()
        };
        let mut scheduler = build_scheduler(&h, settings);

        let report = scheduler.run_tick_at(chicago_half_past_two()).await;
        assert_eq!(report.clock_value, None);
        assert!(!h.flags.is_enabled(Feature::Time));
        assert_eq!(h.sink.messages().len(), 1);

        // Next tick does not re-broadcast: the feature is already off.
        let _ = scheduler.run_tick_at(chicago_half_past_two()).await;
        assert_eq!(h.sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn invalid_weather_settings_disable_weather_on_first_tick() {
        let h = harness(false, true);
        let settings = SyncSettings {
            api_key: "API_KEY".to_owned(),
            ..chicago_settings()
        };
        let mut scheduler = build_scheduler(&h, settings);

        // Validation runs before the cadence check, so tick 1 catches it.
        let report = scheduler.run_tick().await;
        assert_eq!(report.weather, WeatherOutcome::Invalid);
        assert!(!h.flags.is_enabled(Feature::Weather));
        assert!(!h.world.weather_touched());
    }

    #[tokio::test]
    async fn weather_fetch_failure_leaves_world_untouched() {
        let h = harness(false, true);
        let mut scheduler = build_scheduler(&h, chicago_settings());

        let first = scheduler.run_tick().await;
        assert_eq!(first.weather, WeatherOutcome::NotDue);

        let second = scheduler.run_tick().await;
        assert!(matches!(second.weather, WeatherOutcome::Failed { .. }));
        assert!(!h.world.weather_touched());
        // Transient failures never disable the feature.
        assert!(h.flags.is_enabled(Feature::Weather));
        assert!(h.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn weather_fetch_failure_is_logged() {
        let logs = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let h = harness(false, true);
        let mut scheduler = build_scheduler(&h, chicago_settings());
        let _ = scheduler.run_tick().await;
        let report = scheduler.run_tick().await;

        assert!(matches!(report.weather, WeatherOutcome::Failed { .. }));
        let output = logs.contents();
        assert!(
            output.contains("WARN") && output.contains("weather data failed to update"),
            "logs: {output}"
        );
    }

    #[tokio::test]
    async fn tick_persists_toggled_flags() {
        let h = harness(true, false);
        let mut scheduler = build_scheduler(&h, chicago_settings());

        h.flags.toggle(Feature::Time);
        let _ = scheduler.run_tick_at(chicago_half_past_two()).await;

        let document = h.store.document().await;
        assert!(!document.sync_time);
        assert!(!document.sync_weather);
    }

    #[test]
    fn tick_interval_is_clamped() {
        let h = harness(true, false);
        let scheduler = build_scheduler(&h, chicago_settings());
        let scheduler = scheduler.with_tick_interval(Duration::ZERO);
        assert_eq!(scheduler.tick_interval(), Duration::from_millis(MIN_TICK_INTERVAL_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_until_shutdown() {
        let h = harness(true, false);
        let scheduler = build_scheduler(&h, chicago_settings());
        let mut scheduler = scheduler.with_tick_interval(Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        // Ticks fire at 0s, 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        let _ = tx.send(true);

        let ticks = handle.await.unwrap();
        assert_eq!(ticks, 3);
    }
}
