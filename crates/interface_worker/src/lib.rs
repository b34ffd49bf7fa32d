//! Worker Interface - process wiring for the billing reconciler
//!
//! This crate owns everything that happens before the first pass:
//! - Loading and validating [`WorkerConfig`] from the environment
//! - Installing the tracing subscriber
//!
//! The `charger` binary builds the HTTP adapters from the loaded
//! configuration and runs the reconciliation loop until SIGINT or SIGTERM.

pub mod config;
pub mod telemetry;

pub use config::{ConfigError, LogFormat, WorkerConfig};
pub use telemetry::init_tracing;
