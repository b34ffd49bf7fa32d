//! Resolved reconciler configuration
//!
//! Everything the pipeline needs to know about the ledger layout and its
//! own tunables lives in one immutable [`ReconcilerConfig`]. It is built
//! once at startup and shared by reference; no component reads the
//! environment on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use core_kernel::{CoreError, EligibilityWindow, Timezone};

/// Ledger maximum for one list request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Oldest trailing window accepted, ten years back
pub const MIN_STALE_DAYS: i64 = -3650;

/// Description attached to lump-sum charges
pub const DEFAULT_CHARGE_DESCRIPTION: &str = "Cleaning/Product Replacement Charge";

/// Column names for every logical field the pipeline reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBindings {
    pub customer_id: String,
    pub amount: String,
    pub paid: String,
    pub notes: String,
    pub currency: String,
    pub billing_date: String,
    /// Itemized-mode columns
    pub service_date: Option<String>,
    pub quantity: Option<String>,
    pub item_description: Option<String>,
    pub property_label: Option<String>,
}

impl FieldBindings {
    /// Itemized columns, or `None` if any binding is absent
    pub fn itemized(&self) -> Option<ItemizedBindings<'_>> {
        Some(ItemizedBindings {
            service_date: self.service_date.as_deref()?,
            quantity: self.quantity.as_deref()?,
            item_description: self.item_description.as_deref()?,
            property_label: self.property_label.as_deref()?,
        })
    }

    /// Columns requested from the ledger for the given mode
    pub fn fetch_fields(&self, mode: AggregationMode) -> Vec<String> {
        let mut fields = vec![
            self.customer_id.clone(),
            self.amount.clone(),
            self.paid.clone(),
            self.currency.clone(),
            self.billing_date.clone(),
        ];
        if mode == AggregationMode::Itemized {
            if let Some(itemized) = self.itemized() {
                fields.extend(
                    [
                        itemized.service_date,
                        itemized.quantity,
                        itemized.item_description,
                        itemized.property_label,
                    ]
                    .into_iter()
                    .map(str::to_string),
                );
            }
        }
        fields
    }

    /// Ledger formula selecting records whose paid flag is neither
    /// `'true'` nor `'false'`
    pub fn unsettled_filter(&self) -> String {
        format!(
            "AND(NOT({{{paid}}} = 'true'), NOT({{{paid}}} = 'false'))",
            paid = self.paid
        )
    }
}

/// Borrowed view of the itemized-mode columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemizedBindings<'a> {
    pub service_date: &'a str,
    pub quantity: &'a str,
    pub item_description: &'a str,
    pub property_label: &'a str,
}

/// How a customer's items become a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// One payment for the summed amount
    #[default]
    LumpSum,
    /// One invoice with a line per record
    Itemized,
}

/// Invoice settings for itemized mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTerms {
    pub auto_advance: bool,
    pub collection_method: String,
    pub days_until_due: u32,
    pub description: Option<String>,
}

impl Default for InvoiceTerms {
    fn default() -> Self {
        Self {
            auto_advance: true,
            collection_method: "send_invoice".to_string(),
            days_until_due: 30,
            description: None,
        }
    }
}

/// Fully resolved configuration for the reconciliation pipeline
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Ledger table holding billing records
    pub table: String,
    pub fields: FieldBindings,
    pub mode: AggregationMode,
    pub timezone: Timezone,
    pub window: EligibilityWindow,
    pub poll_interval: Duration,
    /// Pause between customer groups, as a courtesy to the ledger API
    pub write_delay: Duration,
    pub page_size: u32,
    pub charge_description: String,
    pub invoice_terms: InvoiceTerms,
}

impl ReconcilerConfig {
    /// Creates a configuration with default tunables
    pub fn new(table: impl Into<String>, fields: FieldBindings, timezone: Timezone) -> Self {
        Self {
            table: table.into(),
            fields,
            mode: AggregationMode::LumpSum,
            timezone,
            window: EligibilityWindow::default(),
            poll_interval: Duration::from_secs(60),
            write_delay: Duration::from_secs(1),
            page_size: MAX_PAGE_SIZE,
            charge_description: DEFAULT_CHARGE_DESCRIPTION.to_string(),
            invoice_terms: InvoiceTerms::default(),
        }
    }

    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stale_days(mut self, stale_days: i64) -> Self {
        self.window = EligibilityWindow::new(stale_days);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Checks cross-field constraints the type system cannot express
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.table.trim().is_empty() {
            return Err(CoreError::configuration("ledger table name is empty"));
        }
        if !(MIN_STALE_DAYS..=0).contains(&self.window.stale_days) {
            return Err(CoreError::configuration(format!(
                "stale_days must be between {} and 0, got {}",
                MIN_STALE_DAYS, self.window.stale_days
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(CoreError::configuration(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.mode == AggregationMode::Itemized && self.fields.itemized().is_none() {
            return Err(CoreError::configuration(
                "itemized mode requires service date, quantity, description and property label columns",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> FieldBindings {
        FieldBindings {
            customer_id: "Stripe Customer".to_string(),
            amount: "Amount".to_string(),
            paid: "Paid".to_string(),
            notes: "Notes".to_string(),
            currency: "Currency".to_string(),
            billing_date: "Bill Date".to_string(),
            service_date: None,
            quantity: None,
            item_description: None,
            property_label: None,
        }
    }

    #[test]
    fn test_unsettled_filter_formula() {
        assert_eq!(
            bindings().unsettled_filter(),
            "AND(NOT({Paid} = 'true'), NOT({Paid} = 'false'))"
        );
    }

    #[test]
    fn test_fetch_fields_lump_sum() {
        let fields = bindings().fetch_fields(AggregationMode::LumpSum);
        assert_eq!(fields.len(), 5);
        assert!(fields.contains(&"Bill Date".to_string()));
    }

    #[test]
    fn test_itemized_requires_all_columns() {
        let mut b = bindings();
        b.service_date = Some("Service Date".to_string());
        b.quantity = Some("Qty".to_string());
        b.item_description = Some("Item".to_string());
        assert!(b.itemized().is_none());

        let config = ReconcilerConfig::new("Invoices", b.clone(), Timezone::default())
            .with_mode(AggregationMode::Itemized);
        assert!(config.validate().is_err());

        b.property_label = Some("Property".to_string());
        let config = ReconcilerConfig::new("Invoices", b.clone(), Timezone::default())
            .with_mode(AggregationMode::Itemized);
        assert!(config.validate().is_ok());
        assert_eq!(b.fetch_fields(AggregationMode::Itemized).len(), 9);
    }

    #[test]
    fn test_positive_stale_days_rejected() {
        let config = ReconcilerConfig::new("Invoices", bindings(), Timezone::default())
            .with_stale_days(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stale_days_lower_bound() {
        let base = ReconcilerConfig::new("Invoices", bindings(), Timezone::default());
        assert!(base.clone().with_stale_days(MIN_STALE_DAYS).validate().is_ok());
        assert!(base.clone().with_stale_days(MIN_STALE_DAYS - 1).validate().is_err());
        assert!(base.with_stale_days(-200_000_000_000_000).validate().is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let base = ReconcilerConfig::new("Invoices", bindings(), Timezone::default());
        assert!(base.clone().with_page_size(0).validate().is_err());
        assert!(base.clone().with_page_size(101).validate().is_err());
        assert!(base.with_page_size(50).validate().is_ok());
    }
}
