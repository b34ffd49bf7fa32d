//! Core Kernel - Foundational types for the billing reconciler
//!
//! This crate provides the building blocks shared by every other crate:
//! - Money with exact decimal arithmetic and minor-unit conversion
//! - Time zone aware billing dates and the stale-date window
//! - Identifiers for ledger records, processor customers and passes
//! - Port error types and marker traits for external adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use temporal::{
    Timezone, TemporalError, Clock, SystemClock, FixedClock,
    EligibilityWindow, DateEligibility, LEDGER_DATE_FORMAT,
};
pub use identifiers::{RecordId, CustomerId, PassId};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, ExternalSystemConfig, ExternalAuthConfig,
    AdapterHealth, HealthCheckResult, HealthCheckable,
};
