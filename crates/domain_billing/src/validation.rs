//! Record eligibility and normalization
//!
//! Every fetched record goes through [`RecordValidator::validate`], which
//! applies the eligibility rules in a fixed order and either produces a
//! [`NormalizedItem`] or the first [`SkipReason`] that applied. Skips are
//! logged and the record is simply reconsidered on the next pass.
//!
//! Rule order:
//!
//! 1. already paid
//! 2. billing date present, due, and inside the stale window
//! 3. service date (itemized mode)
//! 4. customer identifier
//! 5. currency is `usd`
//! 6. amount is a positive number
//! 7. quantity, description and property label (itemized mode)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use core_kernel::{
    Currency, CustomerId, DateEligibility, EligibilityWindow, Money, RecordId, Timezone,
};

use crate::config::{AggregationMode, FieldBindings, ReconcilerConfig};
use crate::field::FieldError;
use crate::record::BillingRecord;

/// Why a record was left out of this pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("customer already charged for this record")]
    AlreadyPaid,

    #[error("{field} not present")]
    MissingField { field: String },

    #[error("{field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("billing date {billing_date} is in the future")]
    NotYetDue { billing_date: NaiveDate },

    #[error("billing date {billing_date} is too old to charge")]
    TooStale { billing_date: NaiveDate },

    #[error("unsupported currency code '{code}'")]
    UnsupportedCurrency { code: String },

    #[error("amount {amount} is not greater than 0")]
    NonPositiveAmount { amount: Decimal },
}

impl From<FieldError> for SkipReason {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::Missing { field } => SkipReason::MissingField { field },
            FieldError::Invalid { field, reason } => SkipReason::InvalidField { field, reason },
        }
    }
}

/// Extra fields carried by a record in itemized mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub quantity: u32,
    pub description: String,
    pub property_label: String,
    pub service_date: NaiveDate,
}

impl ItemDetails {
    /// Invoice line text: description, property and service date
    pub fn line_description(&self) -> String {
        let mut line = format!(
            "{} - {} ({})",
            self.description.trim(),
            self.property_label.trim(),
            self.service_date.format(core_kernel::LEDGER_DATE_FORMAT)
        );
        if self.quantity > 1 {
            line.push_str(&format!(" x{}", self.quantity));
        }
        line
    }
}

/// A record that passed every applicable rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub source_record_id: RecordId,
    pub customer_id: CustomerId,
    /// Positive amount in major units
    pub amount: Money,
    pub billing_date: NaiveDate,
    /// Present only in itemized mode
    pub details: Option<ItemDetails>,
}

impl NormalizedItem {
    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    pub fn service_date(&self) -> Option<NaiveDate> {
        self.details.as_ref().map(|d| d.service_date)
    }
}

/// Outcome of validating a whole batch
#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub items: Vec<NormalizedItem>,
    pub skipped: Vec<(RecordId, SkipReason)>,
}

/// Applies the eligibility policy to raw records
#[derive(Debug, Clone)]
pub struct RecordValidator {
    fields: FieldBindings,
    mode: AggregationMode,
    timezone: Timezone,
    window: EligibilityWindow,
}

impl RecordValidator {
    pub fn new(config: &ReconcilerConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            mode: config.mode,
            timezone: config.timezone,
            window: config.window,
        }
    }

    /// Validates one record against `now`
    pub fn validate(
        &self,
        record: &BillingRecord,
        now: DateTime<Utc>,
    ) -> Result<NormalizedItem, SkipReason> {
        let x = record.extractor();
        let f = &self.fields;

        if x.get(&f.paid).and_then(|v| v.as_display_string()).as_deref() == Some("true") {
            return Err(SkipReason::AlreadyPaid);
        }

        let billing_date = x.date(&f.billing_date, &self.timezone)?;
        match self.window.classify(billing_date, now, &self.timezone) {
            DateEligibility::Due => {}
            DateEligibility::NotYetDue => return Err(SkipReason::NotYetDue { billing_date }),
            DateEligibility::Stale => return Err(SkipReason::TooStale { billing_date }),
        }

        let itemized = match self.mode {
            AggregationMode::LumpSum => None,
            AggregationMode::Itemized => Some(self.fields.itemized().ok_or_else(|| {
                SkipReason::MissingField {
                    field: "itemized column bindings".to_string(),
                }
            })?),
        };

        let service_date = match itemized {
            Some(cols) => Some(x.date(cols.service_date, &self.timezone)?),
            None => None,
        };

        let customer_id = x.customer_id(&f.customer_id)?;

        let code = x.non_blank_string(&f.currency)?.to_lowercase();
        let currency = code
            .parse::<Currency>()
            .map_err(|_| SkipReason::UnsupportedCurrency { code: code.clone() })?;

        let amount = x.amount(&f.amount)?;
        if amount <= Decimal::ZERO {
            return Err(SkipReason::NonPositiveAmount { amount });
        }

        let details = match (itemized, service_date) {
            (Some(cols), Some(service_date)) => Some(ItemDetails {
                quantity: x.quantity(cols.quantity)?,
                description: x.non_blank_string(cols.item_description)?,
                property_label: x.non_blank_string(cols.property_label)?,
                service_date,
            }),
            _ => None,
        };

        Ok(NormalizedItem {
            source_record_id: record.id.clone(),
            customer_id,
            amount: Money::new(amount, currency),
            billing_date,
            details,
        })
    }

    /// Validates a batch, logging every skip
    pub fn validate_batch(&self, records: &[BillingRecord], now: DateTime<Utc>) -> ValidatedBatch {
        let mut batch = ValidatedBatch::default();
        for record in records {
            match self.validate(record, now) {
                Ok(item) => {
                    debug!(record_id = %record.id, customer_id = %item.customer_id, "record eligible");
                    batch.items.push(item);
                }
                Err(reason) => {
                    warn!(record_id = %record.id, reason = %reason, "skipping record");
                    batch.skipped.push((record.id.clone(), reason));
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldMap, FieldValue};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bindings() -> FieldBindings {
        FieldBindings {
            customer_id: "Customer".to_string(),
            amount: "Amount".to_string(),
            paid: "Paid".to_string(),
            notes: "Notes".to_string(),
            currency: "Currency".to_string(),
            billing_date: "Date".to_string(),
            service_date: Some("Service Date".to_string()),
            quantity: Some("Qty".to_string()),
            item_description: Some("Item".to_string()),
            property_label: Some("Property".to_string()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    fn valid_record() -> BillingRecord {
        BillingRecord::new("rec1", FieldMap::new())
            .with_field("Customer", "cus_1")
            .with_field("Amount", dec!(12.50))
            .with_field("Currency", "USD")
            .with_field("Date", "2024-03-08")
    }

    fn lump_sum() -> RecordValidator {
        RecordValidator::new(&ReconcilerConfig::new("T", bindings(), Timezone::default()))
    }

    fn itemized() -> RecordValidator {
        RecordValidator::new(
            &ReconcilerConfig::new("T", bindings(), Timezone::default())
                .with_mode(AggregationMode::Itemized),
        )
    }

    #[test]
    fn test_valid_record_normalizes() {
        let item = lump_sum().validate(&valid_record(), now()).unwrap();
        assert_eq!(item.customer_id.as_str(), "cus_1");
        assert_eq!(item.amount, Money::new(dec!(12.50), Currency::USD));
        assert_eq!(item.billing_date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert!(item.details.is_none());
    }

    #[test]
    fn test_paid_true_string_or_bool_skips() {
        let v = lump_sum();
        let text = valid_record().with_field("Paid", "true");
        let flag = valid_record().with_field("Paid", true);
        assert_eq!(v.validate(&text, now()), Err(SkipReason::AlreadyPaid));
        assert_eq!(v.validate(&flag, now()), Err(SkipReason::AlreadyPaid));
    }

    #[test]
    fn test_other_paid_values_do_not_skip() {
        let record = valid_record().with_field("Paid", "pending");
        assert!(lump_sum().validate(&record, now()).is_ok());
    }

    #[test]
    fn test_paid_check_runs_before_date_checks() {
        let mut record = valid_record().with_field("Paid", "true");
        record.fields.remove("Date");
        assert_eq!(lump_sum().validate(&record, now()), Err(SkipReason::AlreadyPaid));
    }

    #[test]
    fn test_unparseable_billing_date_skips() {
        let record = valid_record().with_field("Date", "next tuesday");
        assert!(matches!(
            lump_sum().validate(&record, now()),
            Err(SkipReason::InvalidField { field, .. }) if field == "Date"
        ));
    }

    #[test]
    fn test_lowercases_currency() {
        let record = valid_record().with_field("Currency", "UsD");
        assert_eq!(lump_sum().validate(&record, now()).unwrap().currency(), Currency::USD);
    }

    #[test]
    fn test_zero_amount_skips() {
        let record = valid_record().with_field("Amount", dec!(0));
        assert_eq!(
            lump_sum().validate(&record, now()),
            Err(SkipReason::NonPositiveAmount { amount: dec!(0) })
        );
    }

    #[test]
    fn test_itemized_needs_service_date_before_customer() {
        let mut record = valid_record();
        record.fields.remove("Customer");
        assert_eq!(
            itemized().validate(&record, now()),
            Err(SkipReason::MissingField {
                field: "Service Date".to_string()
            })
        );
    }

    #[test]
    fn test_itemized_full_record() {
        let record = valid_record()
            .with_field("Service Date", "2024-03-05")
            .with_field("Qty", dec!(2))
            .with_field("Item", "Deep clean")
            .with_field("Property", "12 Elm St");
        let item = itemized().validate(&record, now()).unwrap();
        let details = item.details.unwrap();
        assert_eq!(details.quantity, 2);
        assert_eq!(details.line_description(), "Deep clean - 12 Elm St (2024-03-05) x2");
    }

    #[test]
    fn test_itemized_missing_label_skips() {
        let record = valid_record()
            .with_field("Service Date", "2024-03-05")
            .with_field("Qty", dec!(1))
            .with_field("Item", "Deep clean")
            .with_field("Property", FieldValue::Null);
        assert_eq!(
            itemized().validate(&record, now()),
            Err(SkipReason::MissingField {
                field: "Property".to_string()
            })
        );
    }

    #[test]
    fn test_batch_collects_skips() {
        let good = valid_record();
        let bad = BillingRecord::new("rec2", FieldMap::new());
        let batch = lump_sum().validate_batch(&[good, bad], now());
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].0.as_str(), "rec2");
    }
}
