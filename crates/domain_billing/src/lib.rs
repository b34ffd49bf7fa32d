//! Billing Domain - Ledger to Processor Reconciliation
//!
//! This crate turns unpaid rows of a tabular ledger into charges on a
//! payment processor and writes the outcome back to the ledger.
//!
//! # Pipeline
//!
//! Each pass of the [`Reconciler`] runs these steps in order:
//! - **Fetch** every unsettled record, following continuation cursors
//! - **Validate** each record into a [`NormalizedItem`] or a [`SkipReason`]
//! - **Aggregate** eligible items into one [`CustomerGroup`] per customer
//! - **Charge** each group once, as a payment or an invoice
//! - **Write** paid flag and note back to every contributing record
//!
//! # Settlement Flags
//!
//! A record's paid cell is the only idempotence guard:
//! - `"true"`: charged; the note holds the processor confirmation id
//! - `"false"`: charge failed; the note explains why
//! - anything else: eligible on the next pass
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{Reconciler, ReconcilerConfig};
//!
//! let reconciler = Reconciler::new(Arc::new(config), ledger, processor);
//! let summary = reconciler.run_pass().await?;
//! ```

pub mod field;
pub mod record;
pub mod config;
pub mod validation;
pub mod aggregation;
pub mod charge;
pub mod outcome;
pub mod reconciliation;
pub mod ports;
pub mod error;

pub use field::{FieldError, FieldExtractor, FieldMap, FieldValue};
pub use record::{BillingRecord, RecordPage};
pub use config::{
    AggregationMode, FieldBindings, InvoiceTerms, ReconcilerConfig, DEFAULT_CHARGE_DESCRIPTION,
    MAX_PAGE_SIZE, MIN_STALE_DAYS,
};
pub use validation::{ItemDetails, NormalizedItem, RecordValidator, SkipReason, ValidatedBatch};
pub use aggregation::{CustomerAggregator, CustomerGroup};
pub use charge::{ChargeExecutor, ChargeFailure, ChargeOutcome, FirstAvailable, PaymentMethodSelector};
pub use outcome::{LedgerUpdate, OutcomeWriter, WriteSummary};
pub use reconciliation::{PassStage, PassSummary, Reconciler};
pub use ports::{
    ChargeRequest, InvoiceItemRequest, InvoiceRequest, LedgerPort, PaymentMethodSummary,
    PaymentProcessorPort, RecordQuery,
};
pub use error::BillingError;
