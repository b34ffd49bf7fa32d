//! Test Data Builders
//!
//! Builders that start from a record or pipeline which is valid under the
//! fixture configuration, so each test only states what it changes.

use std::sync::Arc;

use chrono::NaiveDate;
use core_kernel::FixedClock;
use domain_billing::ports::mock::{InMemoryLedger, ScriptedProcessor};
use domain_billing::{
    BillingRecord, FieldMap, FieldValue, PaymentMethodSelector, Reconciler, ReconcilerConfig,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{Columns, ConfigFixtures, TemporalFixtures};

/// Builder for ledger records
///
/// The default record is eligible in lump-sum mode: customer `cus_default`,
/// `$10.00` in `usd`, billed two days before [`TemporalFixtures::now`].
pub struct BillingRecordBuilder {
    id: String,
    fields: FieldMap,
}

impl BillingRecordBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = FieldMap::new();
        fields.insert(Columns::CUSTOMER.to_string(), FieldValue::text("cus_default"));
        fields.insert(Columns::AMOUNT.to_string(), FieldValue::Number(dec!(10.00)));
        fields.insert(Columns::CURRENCY.to_string(), FieldValue::text("usd"));
        fields.insert(
            Columns::BILLING_DATE.to_string(),
            FieldValue::text(TemporalFixtures::days_from_today(-2).to_string()),
        );
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn customer(self, customer_id: &str) -> Self {
        self.set(Columns::CUSTOMER, FieldValue::text(customer_id))
    }

    /// Customer given as a linked-record rollup
    pub fn linked_customer(self, customer_ids: &[&str]) -> Self {
        let links = customer_ids.iter().map(|id| FieldValue::text(*id)).collect();
        self.set(Columns::CUSTOMER, FieldValue::Links(links))
    }

    pub fn amount(self, amount: Decimal) -> Self {
        self.set(Columns::AMOUNT, FieldValue::Number(amount))
    }

    pub fn currency(self, code: &str) -> Self {
        self.set(Columns::CURRENCY, FieldValue::text(code))
    }

    pub fn billing_date(self, date: NaiveDate) -> Self {
        self.set(Columns::BILLING_DATE, FieldValue::text(date.to_string()))
    }

    /// Billing date relative to the fixture "today"
    pub fn billed_days_ago(self, days: i64) -> Self {
        self.billing_date(TemporalFixtures::days_from_today(-days))
    }

    pub fn paid(self, flag: &str) -> Self {
        self.set(Columns::PAID, FieldValue::text(flag))
    }

    /// Adds the four itemized-mode cells
    pub fn item(self, service_date: NaiveDate, quantity: u32, description: &str, property: &str) -> Self {
        self.set(Columns::SERVICE_DATE, FieldValue::text(service_date.to_string()))
            .set(Columns::QUANTITY, FieldValue::Number(Decimal::from(quantity)))
            .set(Columns::ITEM_DESCRIPTION, FieldValue::text(description))
            .set(Columns::PROPERTY_LABEL, FieldValue::text(property))
    }

    pub fn set(mut self, column: &str, value: FieldValue) -> Self {
        self.fields.insert(column.to_string(), value);
        self
    }

    pub fn without(mut self, column: &str) -> Self {
        self.fields.remove(column);
        self
    }

    pub fn build(self) -> BillingRecord {
        BillingRecord::new(self.id, self.fields)
    }
}

/// A reconciler wired to in-memory ports and a fixed clock
pub struct Harness {
    pub ledger: InMemoryLedger,
    pub processor: ScriptedProcessor,
    pub clock: Arc<FixedClock>,
    pub reconciler: Reconciler,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    config: ReconcilerConfig,
    records: Vec<BillingRecord>,
    cards: Vec<(String, Vec<String>)>,
    selector: Option<Arc<dyn PaymentMethodSelector>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessBuilder {
    /// Lump-sum configuration by default
    pub fn new() -> Self {
        Self {
            config: ConfigFixtures::lump_sum(),
            records: Vec::new(),
            cards: Vec::new(),
            selector: None,
        }
    }

    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn record(mut self, record: BillingRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn records(mut self, records: impl IntoIterator<Item = BillingRecord>) -> Self {
        self.records.extend(records);
        self
    }

    pub fn cards(mut self, customer_id: &str, card_ids: &[&str]) -> Self {
        self.cards.push((
            customer_id.to_string(),
            card_ids.iter().map(|id| id.to_string()).collect(),
        ));
        self
    }

    /// Replaces the first-card policy
    pub fn selector(mut self, selector: impl PaymentMethodSelector + 'static) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }

    pub async fn build(self) -> Harness {
        let ledger = InMemoryLedger::with_paid_filter(self.config.fields.paid.clone());
        ledger.insert(self.records).await;

        let mut processor = ScriptedProcessor::new();
        for (customer_id, card_ids) in &self.cards {
            let ids: Vec<&str> = card_ids.iter().map(String::as_str).collect();
            processor = processor.with_cards(customer_id.as_str(), &ids).await;
        }

        let clock = Arc::new(FixedClock::new(TemporalFixtures::now()));
        let mut reconciler = Reconciler::new(
            Arc::new(self.config),
            Arc::new(ledger.clone()),
            Arc::new(processor.clone()),
        )
        .with_clock(clock.clone());
        if let Some(selector) = self.selector {
            reconciler = reconciler.with_selector(selector);
        }

        Harness {
            ledger,
            processor,
            clock,
            reconciler,
        }
    }
}
