//! Custom Test Assertions
//!
//! Assertions over the state of an [`InMemoryLedger`] after a pass, with
//! messages that show the cells actually written.

use core_kernel::{Money, RecordId};
use domain_billing::ports::mock::InMemoryLedger;
use domain_billing::{FieldValue, PassSummary};

use crate::fixtures::Columns;

async fn cell(ledger: &InMemoryLedger, record_id: &str, column: &str) -> Option<FieldValue> {
    let record = ledger
        .record(&RecordId::new(record_id))
        .await
        .unwrap_or_else(|| panic!("record {} not in ledger", record_id));
    record.fields.get(column).cloned()
}

fn text(value: &Option<FieldValue>) -> Option<String> {
    value.as_ref().and_then(FieldValue::as_display_string)
}

/// Asserts the record was marked paid with the given confirmation id
pub async fn assert_marked_paid(ledger: &InMemoryLedger, record_id: &str, confirmation_id: &str) {
    let paid = cell(ledger, record_id, Columns::PAID).await;
    let notes = cell(ledger, record_id, Columns::NOTES).await;
    assert_eq!(
        text(&paid).as_deref(),
        Some("true"),
        "expected {} paid, notes={:?}",
        record_id,
        notes
    );
    assert_eq!(text(&notes).as_deref(), Some(confirmation_id));
}

/// Asserts the record was marked failed with a note containing `fragment`
pub async fn assert_marked_failed(ledger: &InMemoryLedger, record_id: &str, fragment: &str) {
    let paid = cell(ledger, record_id, Columns::PAID).await;
    let notes = text(&cell(ledger, record_id, Columns::NOTES).await).unwrap_or_default();
    assert_eq!(
        text(&paid).as_deref(),
        Some("false"),
        "expected {} failed, notes={:?}",
        record_id,
        notes
    );
    assert!(
        notes.starts_with("Error charging customer through Stripe: "),
        "failure note for {} has no prefix: {:?}",
        record_id,
        notes
    );
    assert!(
        notes.contains(fragment),
        "failure note for {} does not mention {:?}: {:?}",
        record_id,
        fragment,
        notes
    );
}

/// Asserts no update was ever applied to the record
pub async fn assert_untouched(ledger: &InMemoryLedger, record_id: &str) {
    let id = RecordId::new(record_id);
    let writes: Vec<_> = ledger
        .updates()
        .await
        .into_iter()
        .filter(|(updated, _)| updated == &id)
        .collect();
    assert!(writes.is_empty(), "record {} was updated: {:?}", record_id, writes);
}

/// Asserts a money value in USD cents
pub fn assert_minor_units(money: &Money, expected: i64) {
    assert_eq!(
        money.to_minor_units().ok(),
        Some(expected),
        "{} is not {} minor units",
        money,
        expected
    );
}

/// Asserts the per-group counters of a pass
pub fn assert_pass_counts(summary: &PassSummary, groups: usize, charged: usize, failed: usize) {
    assert_eq!(
        (summary.groups, summary.charged, summary.failed),
        (groups, charged, failed),
        "unexpected pass counts: {:?}",
        summary
    );
}

