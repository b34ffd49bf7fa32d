//! Billing domain errors
//!
//! Only pass-level problems surface as [`BillingError`]. Per-record skips
//! ([`crate::SkipReason`]) and per-group charge failures
//! ([`crate::ChargeFailure`]) are data, not errors, and never abort a pass.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that abort a reconciliation pass
#[derive(Debug, Error)]
pub enum BillingError {
    /// A ledger page could not be fetched; the rest of the pass is skipped
    #[error("Failed to fetch ledger page {page}: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: PortError,
    },
}

impl BillingError {
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::Fetch { source, .. } => source.is_transient(),
        }
    }
}
