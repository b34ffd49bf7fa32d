//! Stripe payment processor adapter
//!
//! Implements [`PaymentProcessorPort`] with form-encoded requests against
//! the Stripe REST API. A charge is two calls, create then confirm, so a
//! failed confirmation can leave an unconfirmed payment intent behind;
//! Stripe cancels those on its own.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use core_kernel::{
    CustomerId, DomainPort, ExternalSystemConfig, HealthCheckResult,
    HealthCheckable, PortError,
};
use domain_billing::{
    ChargeRequest, InvoiceItemRequest, InvoiceRequest, PaymentMethodSummary, PaymentProcessorPort,
};

use crate::http::{authorize, build_client, join_url, read_json, transport_error, ErrorDetail};

const SERVICE: &str = "stripe";

type Form = Vec<(&'static str, String)>;

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectId {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentMethodList {
    #[serde(default)]
    pub data: Vec<WirePaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    #[serde(default)]
    pub card: Option<WireCard>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCard {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
}

impl From<WirePaymentMethod> for PaymentMethodSummary {
    fn from(wire: WirePaymentMethod) -> Self {
        let (card_brand, card_last4) = match wire.card {
            Some(card) => (card.brand, card.last4),
            None => (None, None),
        };
        PaymentMethodSummary {
            id: wire.id,
            method_type: wire.method_type,
            card_brand,
            card_last4,
        }
    }
}

pub(crate) fn payment_intent_form(request: &ChargeRequest) -> Form {
    vec![
        ("amount", request.amount_minor.to_string()),
        ("currency", request.currency.code().to_string()),
        ("customer", request.customer_id.to_string()),
        ("payment_method", request.payment_method_id.clone()),
        ("description", request.description.clone()),
    ]
}

pub(crate) fn confirm_form(request: &ChargeRequest) -> Form {
    vec![("payment_method", request.payment_method_id.clone())]
}

pub(crate) fn invoice_item_form(request: &InvoiceItemRequest) -> Form {
    vec![
        ("customer", request.customer_id.to_string()),
        ("amount", request.amount_minor.to_string()),
        ("currency", request.currency.code().to_string()),
        ("description", request.description.clone()),
    ]
}

pub(crate) fn invoice_form(request: &InvoiceRequest) -> Form {
    let mut form: Form = vec![
        ("customer", request.customer_id.to_string()),
        ("auto_advance", request.auto_advance.to_string()),
        ("collection_method", request.collection_method.clone()),
        ("pending_invoice_items_behavior", "include".to_string()),
    ];
    // Stripe rejects days_until_due for charge_automatically invoices
    if request.collection_method == "send_invoice" {
        form.push(("days_until_due", request.days_until_due.to_string()));
    }
    if let Some(description) = &request.description {
        form.push(("description", description.clone()));
    }
    form
}

/// Stripe reports errors as `{"error": {"message", "code", "decline_code"}}`
pub(crate) fn parse_error(body: &str) -> ErrorDetail {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());
    match error {
        Some(obj) => {
            let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
            ErrorDetail {
                message: text("message").unwrap_or_default(),
                code: text("decline_code").or_else(|| text("code")),
                retry_after_secs: None,
            }
        }
        None => ErrorDetail {
            message: body.trim().chars().take(200).collect(),
            ..Default::default()
        },
    }
}

/// Payment processor adapter for one Stripe account
#[derive(Debug, Clone)]
pub struct StripeProcessorAdapter {
    client: Client,
    config: ExternalSystemConfig,
}

impl StripeProcessorAdapter {
    pub fn new(config: ExternalSystemConfig) -> Result<Self, PortError> {
        Ok(Self {
            client: build_client(&config)?,
            config,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        join_url(&self.config.base_url, segments)
    }

    async fn post_form(&self, segments: &[&str], form: &Form, operation: &str) -> Result<ObjectId, PortError> {
        let request = self.client.post(self.url(segments)).form(form);
        let response = authorize(request, &self.config.auth)
            .send()
            .await
            .map_err(|e| transport_error(e, operation, self.config.timeout_ms))?;
        read_json(response, SERVICE, operation, self.config.timeout_ms, parse_error).await
    }
}

impl DomainPort for StripeProcessorAdapter {}

#[async_trait]
impl HealthCheckable for StripeProcessorAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let request = authorize(self.client.get(self.url(&["balance"])), &self.config.auth);
        let probe = match request.send().await {
            Ok(response) => {
                read_json::<Value, _>(response, SERVICE, "balance", self.config.timeout_ms, parse_error)
                    .await
            }
            Err(e) => Err(transport_error(e, "balance", self.config.timeout_ms)),
        };
        HealthCheckResult::from_probe(SERVICE, started, probe)
    }
}

#[async_trait]
impl PaymentProcessorPort for StripeProcessorAdapter {
    #[instrument(skip(self, customer_id), fields(customer_id = %customer_id))]
    async fn list_payment_methods(
        &self,
        customer_id: &CustomerId,
        method_type: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PortError> {
        let request = self
            .client
            .get(self.url(&["payment_methods"]))
            .query(&[("customer", customer_id.as_str()), ("type", method_type)]);
        let response = authorize(request, &self.config.auth)
            .send()
            .await
            .map_err(|e| transport_error(e, "list payment methods", self.config.timeout_ms))?;

        let list: PaymentMethodList = read_json(
            response,
            SERVICE,
            "list payment methods",
            self.config.timeout_ms,
            parse_error,
        )
        .await?;
        debug!(count = list.data.len(), "listed payment methods");
        Ok(list.data.into_iter().map(PaymentMethodSummary::from).collect())
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id, amount_minor = request.amount_minor))]
    async fn create_and_confirm_charge(&self, request: &ChargeRequest) -> Result<String, PortError> {
        let intent = self
            .post_form(&["payment_intents"], &payment_intent_form(request), "create payment intent")
            .await?;
        debug!(payment_intent = %intent.id, "payment intent created");

        let confirmed = self
            .post_form(
                &["payment_intents", intent.id.as_str(), "confirm"],
                &confirm_form(request),
                "confirm payment intent",
            )
            .await?;
        match confirmed.status.as_deref() {
            Some("succeeded") | Some("processing") | None => {}
            Some(other) => warn!(payment_intent = %confirmed.id, status = other, "payment intent not settled"),
        }
        Ok(confirmed.id)
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    async fn create_invoice_item(&self, request: &InvoiceItemRequest) -> Result<String, PortError> {
        let item = self
            .post_form(&["invoiceitems"], &invoice_item_form(request), "create invoice item")
            .await?;
        Ok(item.id)
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, PortError> {
        let invoice = self
            .post_form(&["invoices"], &invoice_form(request), "create invoice")
            .await?;
        Ok(invoice.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use serde_json::json;

    fn charge() -> ChargeRequest {
        ChargeRequest {
            customer_id: CustomerId::new("cus_1"),
            amount_minor: 1975,
            currency: Currency::USD,
            payment_method_id: "pm_1".to_string(),
            description: "Cleaning/Product Replacement Charge".to_string(),
        }
    }

    fn value<'a>(form: &'a Form, key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_payment_intent_form() {
        let form = payment_intent_form(&charge());
        assert_eq!(value(&form, "amount"), Some("1975"));
        assert_eq!(value(&form, "currency"), Some("usd"));
        assert_eq!(value(&form, "customer"), Some("cus_1"));
        assert_eq!(value(&form, "payment_method"), Some("pm_1"));
        assert_eq!(confirm_form(&charge()), vec![("payment_method", "pm_1".to_string())]);
    }

    #[test]
    fn test_invoice_form_send_invoice() {
        let form = invoice_form(&InvoiceRequest {
            customer_id: CustomerId::new("cus_1"),
            auto_advance: true,
            collection_method: "send_invoice".to_string(),
            days_until_due: 30,
            description: None,
        });
        assert_eq!(value(&form, "auto_advance"), Some("true"));
        assert_eq!(value(&form, "days_until_due"), Some("30"));
        assert_eq!(value(&form, "pending_invoice_items_behavior"), Some("include"));
        assert_eq!(value(&form, "description"), None);
    }

    #[test]
    fn test_invoice_form_charge_automatically_omits_due_days() {
        let form = invoice_form(&InvoiceRequest {
            customer_id: CustomerId::new("cus_1"),
            auto_advance: false,
            collection_method: "charge_automatically".to_string(),
            days_until_due: 30,
            description: Some("March services".to_string()),
        });
        assert_eq!(value(&form, "days_until_due"), None);
        assert_eq!(value(&form, "description"), Some("March services"));
    }

    #[test]
    fn test_invoice_item_form() {
        let form = invoice_item_form(&InvoiceItemRequest {
            customer_id: CustomerId::new("cus_1"),
            amount_minor: 4000,
            currency: Currency::USD,
            description: "Deep clean - Unit 1 (2024-03-02)".to_string(),
        });
        assert_eq!(value(&form, "amount"), Some("4000"));
        assert_eq!(value(&form, "description"), Some("Deep clean - Unit 1 (2024-03-02)"));
    }

    #[test]
    fn test_payment_method_list_decodes() {
        let list: PaymentMethodList = serde_json::from_value(json!({
            "object": "list",
            "data": [
                { "id": "pm_1", "type": "card", "card": { "brand": "visa", "last4": "4242" } },
                { "id": "pm_2", "type": "card" }
            ],
            "has_more": false
        }))
        .unwrap();
        let methods: Vec<PaymentMethodSummary> =
            list.data.into_iter().map(PaymentMethodSummary::from).collect();
        assert_eq!(methods[0].card_last4.as_deref(), Some("4242"));
        assert_eq!(methods[1].card_brand, None);
    }

    #[test]
    fn test_parse_error_prefers_decline_code() {
        let detail = parse_error(
            r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#,
        );
        assert_eq!(detail.message, "Your card has insufficient funds.");
        assert_eq!(detail.code.as_deref(), Some("insufficient_funds"));

        let detail = parse_error(r#"{"error":{"message":"No such customer: 'cus_x'","code":"resource_missing"}}"#);
        assert_eq!(detail.code.as_deref(), Some("resource_missing"));
    }
}
