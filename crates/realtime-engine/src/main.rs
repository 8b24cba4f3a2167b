//! Real-time sync engine binary.
//!
//! Loads the sync config, looks up the configured world, and runs the
//! sync scheduler until an operator `stop` or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `realtime-config.yaml`
//! 3. Register hosted worlds and look up the configured one
//! 4. Create enable flags from the loaded config
//! 5. Build the sync scheduler
//! 6. Start the console command reader and Ctrl-C handler
//! 7. Run the scheduler loop
//! 8. Persist enable flags and log the result

mod console;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use realtime_core::config::{ConfigStore, DEFAULT_CONFIG_PATH};
use realtime_core::environment::{Environment, MessageSink, SimulatedWorld, WorldRegistry};
use realtime_core::scheduler::SyncScheduler;
use realtime_core::settings::SyncFlags;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleSink;
use crate::error::EngineError;

/// Environment variable naming the config file.
const ENV_CONFIG_PATH: &str = "REALTIME_CONFIG";

/// Environment variable listing hosted world names, comma-separated.
const ENV_WORLDS: &str = "REALTIME_WORLDS";

/// World hosted when `REALTIME_WORLDS` is unset.
const DEFAULT_WORLD: &str = "world";

/// Application entry point for the sync engine.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, the configured world
/// is not hosted, or the weather client cannot be built.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("realtime-engine starting");

    // 2. Load configuration.
    let config_path = config_path(std::env::args().nth(1), std::env::var(ENV_CONFIG_PATH).ok());
    let store = Arc::new(ConfigStore::load(&config_path).map_err(EngineError::from)?);
    let config = store.effective().await;
    info!(
        path = %config_path.display(),
        world = config.world,
        timezone = config.timezone,
        location = config.location,
        sync_time = config.sync_time,
        sync_weather = config.sync_weather,
        tick_interval_ms = config.tick_interval_ms,
        "Configuration loaded"
    );

    // 3. Look up the configured world.
    let registry = host_worlds(std::env::var(ENV_WORLDS).ok().as_deref());
    let world = match registry.get(&config.world) {
        Ok(world) => world,
        Err(e) => {
            error!(error = %e, "configured world is not available");
            return Err(EngineError::from(e).into());
        }
    };
    info!(world = world.name(), hosted = registry.len(), "World attached");

    // 4. Create enable flags.
    let flags = Arc::new(SyncFlags::from_config(&config));

    // 5. Build the scheduler.
    let sink: Arc<dyn MessageSink> = Arc::new(ConsoleSink);
    let mut scheduler =
        SyncScheduler::from_config(&config, Arc::clone(&flags), Arc::clone(&store), world, sink)
            .map_err(EngineError::from)?;
    info!(
        interval_ms = u64::try_from(scheduler.tick_interval().as_millis()).unwrap_or(u64::MAX),
        "Sync scheduler ready"
    );

    // 6. Console commands and Ctrl-C both end the run loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reader = console::spawn_command_reader(
        console::read_stdin_lines(),
        Arc::clone(&flags),
        Arc::clone(&store),
        shutdown_tx.clone(),
    );
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    // 7. Run the scheduler.
    let ticks = scheduler.run(shutdown_rx).await;
    if let Err(e) = reader.await {
        warn!(error = %e, "console command reader failed");
    }

    // 8. Persist flags and report.
    let (time_enabled, weather_enabled) = flags.snapshot();
    store
        .persist_flags(time_enabled, weather_enabled)
        .await
        .map_err(EngineError::from)?;
    store.save().await.map_err(EngineError::from)?;
    info!(
        ticks,
        sync_time = time_enabled,
        sync_weather = weather_enabled,
        "realtime-engine stopped"
    );

    Ok(())
}

/// Resolve the config file path: CLI argument, then environment, then default.
fn config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Register one simulated world per comma-separated name.
fn host_worlds(names: Option<&str>) -> WorldRegistry {
    let mut registry = WorldRegistry::new();
    let names = names.unwrap_or(DEFAULT_WORLD);
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        registry.register(Arc::new(SimulatedWorld::new(name)) as Arc<dyn Environment>);
    }
    if registry.is_empty() {
        registry.register(Arc::new(SimulatedWorld::new(DEFAULT_WORLD)) as Arc<dyn Environment>);
    }
    registry
}
