//! Writing charge outcomes back to the ledger

use std::sync::Arc;

use tracing::{debug, warn};

use core_kernel::RecordId;

use crate::aggregation::CustomerGroup;
use crate::charge::ChargeOutcome;
use crate::config::FieldBindings;
use crate::field::{FieldMap, FieldValue};
use crate::ports::LedgerPort;

/// Paid flag written after a successful charge
pub const PAID_TRUE: &str = "true";
/// Paid flag written after a failed charge
pub const PAID_FALSE: &str = "false";

/// A partial update for one ledger record
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
    pub record_id: RecordId,
    pub fields: FieldMap,
}

impl LedgerUpdate {
    /// One update per contributing record, all carrying the same flag and note
    pub fn for_outcome(
        group: &CustomerGroup,
        outcome: &ChargeOutcome,
        bindings: &FieldBindings,
    ) -> Vec<LedgerUpdate> {
        let (paid, note) = match outcome {
            ChargeOutcome::Success { confirmation_id } => (PAID_TRUE, confirmation_id.clone()),
            ChargeOutcome::Failure(failure) => (PAID_FALSE, failure.note()),
        };

        group
            .record_ids()
            .into_iter()
            .map(|record_id| {
                let mut fields = FieldMap::new();
                fields.insert(bindings.paid.clone(), FieldValue::text(paid));
                fields.insert(bindings.notes.clone(), FieldValue::text(note.clone()));
                LedgerUpdate { record_id, fields }
            })
            .collect()
    }
}

/// Counts from writing one group's outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub applied: usize,
    pub failed: Vec<RecordId>,
}

impl WriteSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies ledger updates independently of one another
pub struct OutcomeWriter {
    ledger: Arc<dyn LedgerPort>,
    table: String,
    bindings: FieldBindings,
}

impl OutcomeWriter {
    pub fn new(ledger: Arc<dyn LedgerPort>, table: impl Into<String>, bindings: FieldBindings) -> Self {
        Self {
            ledger,
            table: table.into(),
            bindings,
        }
    }

    /// Writes the outcome to every record of the group
    ///
    /// A failed update is logged and counted; the remaining records are
    /// still written.
    pub async fn write(&self, group: &CustomerGroup, outcome: &ChargeOutcome) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for update in LedgerUpdate::for_outcome(group, outcome, &self.bindings) {
            match self
                .ledger
                .update_fields(&self.table, &update.record_id, &update.fields)
                .await
            {
                Ok(()) => {
                    debug!(record_id = %update.record_id, "ledger record updated");
                    summary.applied += 1;
                }
                Err(e) => {
                    warn!(
                        record_id = %update.record_id,
                        customer_id = %group.customer_id,
                        error = %e,
                        "failed to update ledger record"
                    );
                    summary.failed.push(update.record_id);
                }
            }
        }
        summary
    }
}
