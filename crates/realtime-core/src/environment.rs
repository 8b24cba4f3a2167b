//! Seams to the host: the world handle and the operator message sink.
//!
//! The sync core never owns the world it mutates. It holds an
//! `Arc<dyn Environment>` looked up by name at startup, and reports
//! operator-visible errors through a [`MessageSink`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::SyncError;

/// Fixed tag prefixed to every operator-facing message.
///
/// Uses legacy chat color codes: gray brackets, red name, white body.
pub const CHAT_TAG: &str = "\u{a7}7[\u{a7}cRealTime\u{a7}7]\u{a7}f";

/// Prefix a message body with [`CHAT_TAG`].
pub fn tagged(body: &str) -> String {
    format!("{CHAT_TAG} {body}")
}

/// A simulated world whose clock and weather the sync core drives.
pub trait Environment: Send + Sync {
    /// The world's name.
    fn name(&self) -> &str;

    /// Set the world's clock to `value` (day ticks).
    fn set_clock(&self, value: i64);

    /// Set whether the world is stormy.
    fn set_stormy(&self, stormy: bool);
}

/// Destination for operator-visible status and error text.
pub trait MessageSink: Send + Sync {
    /// Deliver a message to every connected viewer.
    fn broadcast(&self, message: &str);
}

/// An in-process world that records the last clock and weather values.
#[derive(Debug)]
pub struct SimulatedWorld {
    name: String,
    clock: AtomicI64,
    stormy: AtomicBool,
    /// Whether [`Environment::set_stormy`] has ever been called.
    weather_set: AtomicBool,
}

impl SimulatedWorld {
    /// Create a world at clock 0 with clear weather.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            clock: AtomicI64::new(0),
            stormy: AtomicBool::new(false),
            weather_set: AtomicBool::new(false),
        }
    }

    /// Current clock value.
    pub fn clock(&self) -> i64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Current storm state.
    pub fn is_stormy(&self) -> bool {
        self.stormy.load(Ordering::Acquire)
    }

    /// Whether the weather has been set since creation.
    pub fn weather_touched(&self) -> bool {
        self.weather_set.load(Ordering::Acquire)
    }
}

impl Environment for SimulatedWorld {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_clock(&self, value: i64) {
        self.clock.store(value, Ordering::Release);
        debug!(world = self.name, clock = value, "world clock set");
    }

    fn set_stormy(&self, stormy: bool) {
        self.stormy.store(stormy, Ordering::Release);
        self.weather_set.store(true, Ordering::Release);
        debug!(world = self.name, stormy, "world weather set");
    }
}

/// Worlds hosted by the process, looked up by name.
#[derive(Default)]
pub struct WorldRegistry {
    worlds: BTreeMap<String, Arc<dyn Environment>>,
}

impl WorldRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a world under its own name, replacing any previous entry.
    pub fn register(&mut self, world: Arc<dyn Environment>) {
        self.worlds.insert(world.name().to_owned(), world);
    }

    /// Look up a world by name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EnvironmentUnavailable`] if no world with that
    /// name is registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Environment>, SyncError> {
        self.worlds
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::EnvironmentUnavailable {
                name: name.to_owned(),
                known: self.worlds.keys().cloned().collect(),
            })
    }

    /// Number of registered worlds.
    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    /// Whether no worlds are registered.
    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

/// A sink that only logs broadcasts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn broadcast(&self, message: &str) {
        info!(text = message, "broadcast");
    }
}

/// A sink that keeps every broadcast, for tests and status queries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Copy of all messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MessageSink for RecordingSink {
    fn broadcast(&self, message: &str) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push(message.to_owned());
        }
    }
}
