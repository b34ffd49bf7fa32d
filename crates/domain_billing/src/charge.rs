//! Charge execution against the payment processor
//!
//! A [`CustomerGroup`] becomes exactly one processor-side object per pass:
//! a confirmed payment in lump-sum mode or an invoice in itemized mode.
//! Nothing here retries; a failed group is written back as unpaid and
//! picked up again only if someone resets its paid flag.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use core_kernel::{CustomerId, MoneyError};

use crate::aggregation::CustomerGroup;
use crate::config::{AggregationMode, InvoiceTerms, ReconcilerConfig};
use crate::ports::{
    ChargeRequest, InvoiceItemRequest, InvoiceRequest, PaymentMethodSummary, PaymentProcessorPort,
};

/// Payment method type the reconciler charges against
pub const CARD_METHOD_TYPE: &str = "card";

/// Why a customer group could not be charged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeFailure {
    #[error("no card on file for customer {customer_id}")]
    NoPaymentMethod { customer_id: CustomerId },

    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("unsupported currency: {detail}")]
    UnsupportedCurrency { detail: String },

    #[error("could not list payment methods: {detail}")]
    PaymentMethodLookup { detail: String },

    #[error("{detail}")]
    Rejected { detail: String },

    #[error("could not create invoice: {detail}")]
    InvoiceCreation { detail: String },

    #[error("all {attempted} invoice lines failed")]
    NoInvoiceLines { attempted: usize },
}

impl ChargeFailure {
    /// Human-readable text written to the ledger notes column
    pub fn note(&self) -> String {
        format!("Error charging customer through Stripe: {}", self)
    }
}

impl From<MoneyError> for ChargeFailure {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::UnsupportedCurrency(_) | MoneyError::CurrencyMismatch(..) => {
                ChargeFailure::UnsupportedCurrency {
                    detail: err.to_string(),
                }
            }
            other => ChargeFailure::InvalidAmount {
                reason: other.to_string(),
            },
        }
    }
}

/// Result of charging one customer group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Processor id of the payment or invoice
    Success { confirmation_id: String },
    Failure(ChargeFailure),
}

impl ChargeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChargeOutcome::Success { .. })
    }
}

impl From<Result<String, ChargeFailure>> for ChargeOutcome {
    fn from(result: Result<String, ChargeFailure>) -> Self {
        match result {
            Ok(confirmation_id) => ChargeOutcome::Success { confirmation_id },
            Err(failure) => ChargeOutcome::Failure(failure),
        }
    }
}

/// Chooses which stored method to charge
pub trait PaymentMethodSelector: Send + Sync + fmt::Debug {
    fn select<'a>(&self, methods: &'a [PaymentMethodSummary]) -> Option<&'a PaymentMethodSummary>;
}

/// Uses the first method the processor lists
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl PaymentMethodSelector for FirstAvailable {
    fn select<'a>(&self, methods: &'a [PaymentMethodSummary]) -> Option<&'a PaymentMethodSummary> {
        methods.first()
    }
}

/// Turns customer groups into processor charges or invoices
pub struct ChargeExecutor {
    processor: Arc<dyn PaymentProcessorPort>,
    selector: Arc<dyn PaymentMethodSelector>,
    mode: AggregationMode,
    charge_description: String,
    invoice_terms: InvoiceTerms,
}

impl ChargeExecutor {
    pub fn new(
        processor: Arc<dyn PaymentProcessorPort>,
        selector: Arc<dyn PaymentMethodSelector>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            processor,
            selector,
            mode: config.mode,
            charge_description: config.charge_description.clone(),
            invoice_terms: config.invoice_terms.clone(),
        }
    }

    /// Charges one group; never panics and never retries
    #[instrument(skip(self, group), fields(customer_id = %group.customer_id, items = group.len()))]
    pub async fn execute(&self, group: &CustomerGroup) -> ChargeOutcome {
        let result = match self.mode {
            AggregationMode::LumpSum => self.charge_lump_sum(group).await,
            AggregationMode::Itemized => self.invoice_itemized(group).await,
        };
        match &result {
            Ok(id) => info!(confirmation_id = %id, "customer charged"),
            Err(failure) => warn!(error = %failure, "charge failed"),
        }
        result.into()
    }

    async fn charge_lump_sum(&self, group: &CustomerGroup) -> Result<String, ChargeFailure> {
        let total = group.total()?;
        let amount_minor = total.to_minor_units()?;
        if amount_minor <= 0 {
            return Err(ChargeFailure::InvalidAmount {
                reason: format!("{} converts to {} minor units", total, amount_minor),
            });
        }

        let methods = self
            .processor
            .list_payment_methods(&group.customer_id, CARD_METHOD_TYPE)
            .await
            .map_err(|e| ChargeFailure::PaymentMethodLookup {
                detail: e.to_string(),
            })?;
        let method = self
            .selector
            .select(&methods)
            .ok_or_else(|| ChargeFailure::NoPaymentMethod {
                customer_id: group.customer_id.clone(),
            })?;
        debug!(payment_method = %method.id, amount_minor, "charging stored card");

        let request = ChargeRequest {
            customer_id: group.customer_id.clone(),
            amount_minor,
            currency: group.currency,
            payment_method_id: method.id.clone(),
            description: self.charge_description.clone(),
        };
        self.processor
            .create_and_confirm_charge(&request)
            .await
            .map_err(|e| ChargeFailure::Rejected {
                detail: e.to_string(),
            })
    }

    async fn invoice_itemized(&self, group: &CustomerGroup) -> Result<String, ChargeFailure> {
        let mut created = 0usize;

        for item in &group.items {
            let amount_minor = match item.amount.to_minor_units() {
                Ok(minor) if minor > 0 => minor,
                Ok(minor) => {
                    warn!(record_id = %item.source_record_id, amount_minor = minor, "skipping invoice line with no value");
                    continue;
                }
                Err(e) => {
                    warn!(record_id = %item.source_record_id, error = %e, "skipping invoice line");
                    continue;
                }
            };
            let description = item
                .details
                .as_ref()
                .map(|d| d.line_description())
                .unwrap_or_else(|| self.charge_description.clone());

            let request = InvoiceItemRequest {
                customer_id: group.customer_id.clone(),
                amount_minor,
                currency: item.currency(),
                description,
            };
            match self.processor.create_invoice_item(&request).await {
                Ok(item_id) => {
                    debug!(record_id = %item.source_record_id, invoice_item = %item_id, "invoice line added");
                    created += 1;
                }
                Err(e) => {
                    warn!(record_id = %item.source_record_id, error = %e, "invoice line failed");
                }
            }
        }

        if created == 0 {
            return Err(ChargeFailure::NoInvoiceLines {
                attempted: group.len(),
            });
        }

        let request = InvoiceRequest {
            customer_id: group.customer_id.clone(),
            auto_advance: self.invoice_terms.auto_advance,
            collection_method: self.invoice_terms.collection_method.clone(),
            days_until_due: self.invoice_terms.days_until_due,
            description: self.invoice_terms.description.clone(),
        };
        self.processor
            .create_invoice(&request)
            .await
            .map_err(|e| ChargeFailure::InvoiceCreation {
                detail: e.to_string(),
            })
    }
}

impl fmt::Debug for ChargeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargeExecutor")
            .field("selector", &self.selector)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldBindings;
    use crate::ports::mock::{ProcessorCall, ScriptedProcessor};
    use crate::validation::{ItemDetails, NormalizedItem};
    use chrono::NaiveDate;
    use core_kernel::{Currency, Money, RecordId, Timezone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn config(mode: AggregationMode) -> ReconcilerConfig {
        let fields = FieldBindings {
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
        };
        ReconcilerConfig::new("T", fields, Timezone::default()).with_mode(mode)
    }

    fn item(record: &str, amount: Decimal, label: &str, day: u32) -> NormalizedItem {
        NormalizedItem {
            source_record_id: RecordId::new(record),
            customer_id: CustomerId::new("cus_1"),
            amount: Money::new(amount, Currency::USD),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            details: Some(ItemDetails {
                quantity: 1,
                description: "Deep clean".to_string(),
                property_label: label.to_string(),
                service_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            }),
        }
    }

    fn group(items: Vec<NormalizedItem>) -> CustomerGroup {
        CustomerGroup {
            customer_id: CustomerId::new("cus_1"),
            currency: Currency::USD,
            items,
        }
    }

    fn executor(processor: &ScriptedProcessor, mode: AggregationMode) -> ChargeExecutor {
        ChargeExecutor::new(Arc::new(processor.clone()), Arc::new(FirstAvailable), &config(mode))
    }

    #[test]
    fn test_first_available_selects_first() {
        let methods = vec![PaymentMethodSummary::card("pm_a"), PaymentMethodSummary::card("pm_b")];
        assert_eq!(FirstAvailable.select(&methods).unwrap().id, "pm_a");
        assert!(FirstAvailable.select(&[]).is_none());
    }

    #[test]
    fn test_failure_note_prefix() {
        let failure = ChargeFailure::Rejected {
            detail: "Your card was declined.".to_string(),
        };
        assert_eq!(failure.note(), "Error charging customer through Stripe: Your card was declined.");
    }

    #[tokio::test]
    async fn test_lump_sum_charges_total_with_first_card() {
        let processor = ScriptedProcessor::new()
            .with_cards("cus_1", &["pm_1", "pm_2"])
            .await;
        let outcome = executor(&processor, AggregationMode::LumpSum)
            .execute(&group(vec![item("r1", dec!(12.50), "A", 1), item("r2", dec!(7.25), "B", 2)]))
            .await;

        assert!(outcome.is_success());
        let charges = processor.charges().await;
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].amount_minor, 1975);
        assert_eq!(charges[0].payment_method_id, "pm_1");
        assert_eq!(charges[0].description, "Cleaning/Product Replacement Charge");
    }

    #[tokio::test]
    async fn test_no_card_is_failure_without_charge() {
        let processor = ScriptedProcessor::new();
        let outcome = executor(&processor, AggregationMode::LumpSum)
            .execute(&group(vec![item("r1", dec!(5), "A", 1)]))
            .await;

        assert!(matches!(
            outcome,
            ChargeOutcome::Failure(ChargeFailure::NoPaymentMethod { .. })
        ));
        assert!(processor.charges().await.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_is_failure_without_charge() {
        let processor = ScriptedProcessor::new().with_cards("cus_1", &["pm_1"]).await;
        processor.fail_listing_for("cus_1").await;
        let outcome = executor(&processor, AggregationMode::LumpSum)
            .execute(&group(vec![item("r1", dec!(5), "A", 1)]))
            .await;

        match outcome {
            ChargeOutcome::Failure(failure @ ChargeFailure::PaymentMethodLookup { .. }) => {
                assert_eq!(
                    failure.note(),
                    "Error charging customer through Stripe: could not list payment methods: Customer cus_1 does not exist"
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(processor.charges().await.is_empty());
        assert_eq!(processor.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sub_cent_total_is_invalid_amount() {
        let processor = ScriptedProcessor::new().with_cards("cus_1", &["pm_1"]).await;
        let outcome = executor(&processor, AggregationMode::LumpSum)
            .execute(&group(vec![item("r1", dec!(0.004), "A", 1)]))
            .await;

        assert!(matches!(
            outcome,
            ChargeOutcome::Failure(ChargeFailure::InvalidAmount { .. })
        ));
        assert!(processor.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_declined_card_is_rejected() {
        let processor = ScriptedProcessor::new().with_cards("cus_1", &["pm_1"]).await;
        processor.decline("cus_1").await;
        let outcome = executor(&processor, AggregationMode::LumpSum)
            .execute(&group(vec![item("r1", dec!(5), "A", 1)]))
            .await;

        match outcome {
            ChargeOutcome::Failure(ChargeFailure::Rejected { detail }) => {
                assert!(detail.contains("declined"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_itemized_creates_lines_then_invoice() {
        let processor = ScriptedProcessor::new();
        let outcome = executor(&processor, AggregationMode::Itemized)
            .execute(&group(vec![item("r1", dec!(40), "Unit 1", 2), item("r2", dec!(15.5), "Unit 2", 4)]))
            .await;

        assert!(outcome.is_success());
        let calls = processor.calls().await;
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[2], ProcessorCall::Invoice(_)));

        let lines = processor.invoice_items().await;
        assert_eq!(lines[0].description, "Deep clean - Unit 1 (2024-03-02)");
        assert_eq!(lines[1].amount_minor, 1550);

        let invoice = &processor.invoices().await[0];
        assert!(invoice.auto_advance);
        assert_eq!(invoice.collection_method, "send_invoice");
        assert_eq!(invoice.days_until_due, 30);
    }

    #[tokio::test]
    async fn test_itemized_partial_line_failure_still_invoices() {
        let processor = ScriptedProcessor::new();
        processor.fail_invoice_items_containing("Unit 1").await;
        let outcome = executor(&processor, AggregationMode::Itemized)
            .execute(&group(vec![item("r1", dec!(40), "Unit 1", 2), item("r2", dec!(15), "Unit 2", 4)]))
            .await;

        assert!(outcome.is_success());
        assert_eq!(processor.invoices().await.len(), 1);
    }

    #[tokio::test]
    async fn test_itemized_all_lines_failing_skips_invoice() {
        let processor = ScriptedProcessor::new();
        processor.fail_invoice_items_containing("Unit").await;
        let outcome = executor(&processor, AggregationMode::Itemized)
            .execute(&group(vec![item("r1", dec!(40), "Unit 1", 2), item("r2", dec!(15), "Unit 2", 4)]))
            .await;

        assert_eq!(
            outcome,
            ChargeOutcome::Failure(ChargeFailure::NoInvoiceLines { attempted: 2 })
        );
        assert!(processor.invoices().await.is_empty());
    }

    #[tokio::test]
    async fn test_invoice_creation_failure() {
        let processor = ScriptedProcessor::new();
        processor.fail_invoice_for("cus_1").await;
        let outcome = executor(&processor, AggregationMode::Itemized)
            .execute(&group(vec![item("r1", dec!(40), "Unit 1", 2)]))
            .await;

        assert!(matches!(
            outcome,
            ChargeOutcome::Failure(ChargeFailure::InvoiceCreation { .. })
        ));
    }
}
