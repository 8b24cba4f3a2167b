//! Clock and weather synchronization core.
//!
//! This crate owns the periodic sync cycle that mirrors real-world time
//! and weather onto a simulated world: every tick re-validates settings,
//! pushes a clock value derived from a configured timezone, and on every
//! other tick fetches current conditions from the weather provider and
//! sets the world's storm flag.
//!
//! # Modules
//!
//! - [`cadence`] -- Per-task "every Nth tick" counters.
//! - [`clock`] -- Timezone resolution and clock value computation.
//! - [`command`] -- Operator toggle commands (`synctime`, `syncweather`).
//! - [`config`] -- Persisted YAML configuration and the [`ConfigStore`].
//! - [`environment`] -- The [`Environment`] and [`MessageSink`] seams, the
//!   in-process [`SimulatedWorld`], and world lookup.
//! - [`error`] -- Top-level [`SyncError`].
//! - [`scheduler`] -- The tick cycle and run loop.
//! - [`settings`] -- Validated settings, shared enable flags, validation.
//! - [`weather`] -- Weather provider client and storm reduction.
//!
//! [`ConfigStore`]: config::ConfigStore
//! [`Environment`]: environment::Environment
//! [`MessageSink`]: environment::MessageSink
//! [`SimulatedWorld`]: environment::SimulatedWorld
//! [`SyncError`]: error::SyncError

pub mod cadence;
pub mod clock;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod weather;
