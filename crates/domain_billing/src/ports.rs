//! Billing Domain Ports
//!
//! The reconciler depends on two external systems through these traits:
//!
//! - [`LedgerPort`]: the tabular store holding billing records
//! - [`PaymentProcessorPort`]: the processor holding customers' payment
//!   methods, charges and invoices
//!
//! Adapters live in `infra_external` (HTTP) and in [`mock`] (in memory).
//!
//! ```rust,ignore
//! let reconciler = Reconciler::new(
//!     Arc::new(config),
//!     Arc::new(AirtableLedgerAdapter::new(airtable)?),
//!     Arc::new(StripeProcessorAdapter::new(stripe)?),
//! );
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, CustomerId, DomainPort, HealthCheckable, PortError, RecordId};

use crate::field::FieldMap;
use crate::record::RecordPage;

/// Parameters for one ledger list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub table: String,
    pub fields: Vec<String>,
    pub filter_formula: String,
    pub page_size: u32,
}

/// Record storage the reconciler reads from and writes outcomes to
#[async_trait]
pub trait LedgerPort: DomainPort + HealthCheckable {
    /// Lists one page of records matching the query
    ///
    /// # Arguments
    ///
    /// * `query` - Table, columns, filter formula and page size
    /// * `cursor` - Continuation cursor from the previous page, if any
    async fn list_records(
        &self,
        query: &RecordQuery,
        cursor: Option<&str>,
    ) -> Result<RecordPage, PortError>;

    /// Sets only the given fields on one record, leaving others untouched
    async fn update_fields(
        &self,
        table: &str,
        record_id: &RecordId,
        fields: &FieldMap,
    ) -> Result<(), PortError>;
}

/// A stored payment method as reported by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSummary {
    pub id: String,
    pub method_type: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

impl PaymentMethodSummary {
    pub fn card(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method_type: "card".to_string(),
            card_brand: None,
            card_last4: None,
        }
    }
}

/// A payment to create and confirm in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub customer_id: CustomerId,
    pub amount_minor: i64,
    pub currency: Currency,
    pub payment_method_id: String,
    pub description: String,
}

/// A pending invoice line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItemRequest {
    pub customer_id: CustomerId,
    pub amount_minor: i64,
    pub currency: Currency,
    pub description: String,
}

/// An invoice collecting the customer's pending lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub customer_id: CustomerId,
    pub auto_advance: bool,
    pub collection_method: String,
    pub days_until_due: u32,
    pub description: Option<String>,
}

/// The processor of record for cards, charges and invoices
///
/// None of these calls are retried by the reconciler.
#[async_trait]
pub trait PaymentProcessorPort: DomainPort + HealthCheckable {
    /// Lists the customer's stored payment methods of the given type
    async fn list_payment_methods(
        &self,
        customer_id: &CustomerId,
        method_type: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PortError>;

    /// Creates and confirms a payment, returning its confirmation id
    async fn create_and_confirm_charge(&self, request: &ChargeRequest) -> Result<String, PortError>;

    /// Adds a pending invoice line, returning the line id
    async fn create_invoice_item(&self, request: &InvoiceItemRequest) -> Result<String, PortError>;

    /// Creates an invoice from pending lines, returning the invoice id
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, PortError>;
}

/// In-memory ports for tests and local dry runs
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::HealthCheckResult;

    use crate::field::FieldExtractor;
    use crate::record::BillingRecord;

    #[derive(Debug, Default)]
    struct LedgerState {
        records: Vec<BillingRecord>,
        queries: Vec<(RecordQuery, Option<String>)>,
        updates: Vec<(RecordId, FieldMap)>,
        fail_list_at_call: Option<usize>,
        failing_updates: HashSet<RecordId>,
        echo_cursor: bool,
    }

    /// In-memory ledger with offset cursors
    ///
    /// When a paid column is configured, listing mimics the unsettled
    /// filter by hiding records whose paid cell reads `true` or `false`.
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryLedger {
        state: Arc<RwLock<LedgerState>>,
        paid_field: Option<String>,
    }

    impl InMemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Ledger that filters on the given paid column
        pub fn with_paid_filter(paid_field: impl Into<String>) -> Self {
            Self {
                state: Arc::default(),
                paid_field: Some(paid_field.into()),
            }
        }

        pub async fn insert(&self, records: impl IntoIterator<Item = BillingRecord>) {
            self.state.write().await.records.extend(records);
        }

        /// Makes the n-th list call (zero based) fail with a connection error
        pub async fn fail_list_at_call(&self, call: usize) {
            self.state.write().await.fail_list_at_call = Some(call);
        }

        /// Continuation requests are answered with the cursor they sent
        pub async fn echo_cursor(&self) {
            self.state.write().await.echo_cursor = true;
        }

        /// Makes every update of the given record fail
        pub async fn fail_updates_for(&self, record_id: impl Into<RecordId>) {
            self.state.write().await.failing_updates.insert(record_id.into());
        }

        pub async fn record(&self, record_id: &RecordId) -> Option<BillingRecord> {
            self.state
                .read()
                .await
                .records
                .iter()
                .find(|r| &r.id == record_id)
                .cloned()
        }

        /// Successful updates in application order
        pub async fn updates(&self) -> Vec<(RecordId, FieldMap)> {
            self.state.read().await.updates.clone()
        }

        /// List requests received, with their cursors
        pub async fn queries(&self) -> Vec<(RecordQuery, Option<String>)> {
            self.state.read().await.queries.clone()
        }

        fn is_settled(&self, record: &BillingRecord) -> bool {
            let Some(paid_field) = self.paid_field.as_deref() else {
                return false;
            };
            matches!(
                FieldExtractor::new(&record.fields).string(paid_field).as_deref(),
                Ok("true") | Ok("false")
            )
        }
    }

    impl DomainPort for InMemoryLedger {}

    #[async_trait]
    impl HealthCheckable for InMemoryLedger {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("in-memory-ledger", "in-memory adapter")
        }
    }

    #[async_trait]
    impl LedgerPort for InMemoryLedger {
        async fn list_records(
            &self,
            query: &RecordQuery,
            cursor: Option<&str>,
        ) -> Result<RecordPage, PortError> {
            let mut state = self.state.write().await;
            let call = state.queries.len();
            state.queries.push((query.clone(), cursor.map(str::to_string)));

            if state.fail_list_at_call == Some(call) {
                return Err(PortError::connection("ledger unreachable"));
            }

            let offset = match cursor {
                None => 0,
                Some(c) => c
                    .parse::<usize>()
                    .map_err(|_| PortError::validation(format!("invalid cursor {}", c)))?,
            };

            let visible: Vec<BillingRecord> = state
                .records
                .iter()
                .filter(|r| !self.is_settled(r))
                .cloned()
                .collect();

            let page_size = query.page_size.max(1) as usize;
            let records: Vec<BillingRecord> =
                visible.iter().skip(offset).take(page_size).cloned().collect();
            let next = offset + records.len();
            let next_cursor = match cursor {
                Some(c) if state.echo_cursor => Some(c.to_string()),
                _ => (next < visible.len()).then(|| next.to_string()),
            };

            Ok(RecordPage {
                records,
                next_cursor,
            })
        }

        async fn update_fields(
            &self,
            _table: &str,
            record_id: &RecordId,
            fields: &FieldMap,
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if state.failing_updates.contains(record_id) {
                return Err(PortError::ServiceUnavailable {
                    service: "ledger".to_string(),
                });
            }
            let record = state
                .records
                .iter_mut()
                .find(|r| &r.id == record_id)
                .ok_or_else(|| PortError::not_found("Record", record_id))?;
            for (name, value) in fields {
                record.fields.insert(name.clone(), value.clone());
            }
            state.updates.push((record_id.clone(), fields.clone()));
            Ok(())
        }
    }

    /// A call received by [`ScriptedProcessor`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProcessorCall {
        ListPaymentMethods { customer_id: CustomerId, method_type: String },
        Charge(ChargeRequest),
        InvoiceItem(InvoiceItemRequest),
        Invoice(InvoiceRequest),
    }

    #[derive(Debug, Default)]
    struct ProcessorState {
        methods: HashMap<CustomerId, Vec<PaymentMethodSummary>>,
        calls: Vec<ProcessorCall>,
        failing_listings: HashSet<CustomerId>,
        declined_customers: HashSet<CustomerId>,
        failing_item_descriptions: Vec<String>,
        failing_invoices: HashSet<CustomerId>,
        sequence: u64,
    }

    /// Payment processor whose responses are scripted per customer
    #[derive(Debug, Default, Clone)]
    pub struct ScriptedProcessor {
        state: Arc<RwLock<ProcessorState>>,
    }

    impl ScriptedProcessor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers stored cards for a customer
        pub async fn with_cards(self, customer_id: impl Into<CustomerId>, card_ids: &[&str]) -> Self {
            self.state.write().await.methods.insert(
                customer_id.into(),
                card_ids.iter().map(|id| PaymentMethodSummary::card(*id)).collect(),
            );
            self
        }

        pub async fn fail_listing_for(&self, customer_id: impl Into<CustomerId>) {
            self.state.write().await.failing_listings.insert(customer_id.into());
        }

        /// Every charge for this customer is declined
        pub async fn decline(&self, customer_id: impl Into<CustomerId>) {
            self.state.write().await.declined_customers.insert(customer_id.into());
        }

        /// Invoice lines whose description contains `fragment` fail
        pub async fn fail_invoice_items_containing(&self, fragment: impl Into<String>) {
            self.state.write().await.failing_item_descriptions.push(fragment.into());
        }

        pub async fn fail_invoice_for(&self, customer_id: impl Into<CustomerId>) {
            self.state.write().await.failing_invoices.insert(customer_id.into());
        }

        pub async fn calls(&self) -> Vec<ProcessorCall> {
            self.state.read().await.calls.clone()
        }

        pub async fn charges(&self) -> Vec<ChargeRequest> {
            self.calls()
                .await
                .into_iter()
                .filter_map(|c| match c {
                    ProcessorCall::Charge(request) => Some(request),
                    _ => None,
                })
                .collect()
        }

        pub async fn invoice_items(&self) -> Vec<InvoiceItemRequest> {
            self.calls()
                .await
                .into_iter()
                .filter_map(|c| match c {
                    ProcessorCall::InvoiceItem(request) => Some(request),
                    _ => None,
                })
                .collect()
        }

        pub async fn invoices(&self) -> Vec<InvoiceRequest> {
            self.calls()
                .await
                .into_iter()
                .filter_map(|c| match c {
                    ProcessorCall::Invoice(request) => Some(request),
                    _ => None,
                })
                .collect()
        }
    }

    impl ProcessorState {
        fn next_id(&mut self, prefix: &str) -> String {
            self.sequence += 1;
            format!("{}_{:04}", prefix, self.sequence)
        }
    }

    impl DomainPort for ScriptedProcessor {}

    #[async_trait]
    impl HealthCheckable for ScriptedProcessor {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("scripted-processor", "in-memory adapter")
        }
    }

    #[async_trait]
    impl PaymentProcessorPort for ScriptedProcessor {
        async fn list_payment_methods(
            &self,
            customer_id: &CustomerId,
            method_type: &str,
        ) -> Result<Vec<PaymentMethodSummary>, PortError> {
            let mut state = self.state.write().await;
            state.calls.push(ProcessorCall::ListPaymentMethods {
                customer_id: customer_id.clone(),
                method_type: method_type.to_string(),
            });
            if state.failing_listings.contains(customer_id) {
                return Err(PortError::not_found("Customer", customer_id));
            }
            Ok(state
                .methods
                .get(customer_id)
                .map(|methods| {
                    methods
                        .iter()
                        .filter(|m| m.method_type == method_type)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn create_and_confirm_charge(&self, request: &ChargeRequest) -> Result<String, PortError> {
            let mut state = self.state.write().await;
            state.calls.push(ProcessorCall::Charge(request.clone()));
            if state.declined_customers.contains(&request.customer_id) {
                return Err(PortError::Rejected {
                    message: "Your card was declined.".to_string(),
                    code: Some("card_declined".to_string()),
                });
            }
            Ok(state.next_id("pi"))
        }

        async fn create_invoice_item(&self, request: &InvoiceItemRequest) -> Result<String, PortError> {
            let mut state = self.state.write().await;
            state.calls.push(ProcessorCall::InvoiceItem(request.clone()));
            if state
                .failing_item_descriptions
                .iter()
                .any(|fragment| request.description.contains(fragment.as_str()))
            {
                return Err(PortError::validation("invoice item rejected"));
            }
            Ok(state.next_id("ii"))
        }

        async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, PortError> {
            let mut state = self.state.write().await;
            state.calls.push(ProcessorCall::Invoice(request.clone()));
            if state.failing_invoices.contains(&request.customer_id) {
                return Err(PortError::ServiceUnavailable {
                    service: "invoices".to_string(),
                });
            }
            Ok(state.next_id("in"))
        }
    }

    /// Reads the paid and notes cells of an update for assertions
    pub fn update_flags(fields: &FieldMap, paid: &str, notes: &str) -> (Option<String>, Option<String>) {
        let x = FieldExtractor::new(fields);
        (x.string(paid).ok(), x.string(notes).ok())
    }
}
