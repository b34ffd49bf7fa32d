//! Test Utilities Crate
//!
//! Shared fixtures, builders and assertions for the billing test suites.
//!
//! # Modules
//!
//! - `fixtures`: Column names, a fixed "now" and ready-made configurations
//! - `builders`: Record builders and a reconciler harness over in-memory ports
//! - `assertions`: Ledger state assertions
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
