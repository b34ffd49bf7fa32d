//! Airtable ledger adapter
//!
//! Implements [`LedgerPort`] over the Airtable REST API:
//!
//! - list: `GET {base_url}/{base_id}/{table}` with `fields[]`,
//!   `filterByFormula`, `pageSize` and `offset` query parameters
//! - update: `PATCH {base_url}/{base_id}/{table}/{record_id}` with a
//!   `{"fields": {...}}` body, which leaves other cells untouched
//!
//! Cell values are decoded into [`FieldValue`] without coercion; the
//! domain decides what shapes it accepts.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use core_kernel::{
    DomainPort, ExternalSystemConfig, HealthCheckResult, HealthCheckable,
    PortError, RecordId,
};
use domain_billing::{BillingRecord, FieldMap, FieldValue, LedgerPort, RecordPage, RecordQuery};

use crate::http::{authorize, build_client, join_url, read_json, transport_error, ErrorDetail};

const SERVICE: &str = "airtable";

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub records: Vec<WireRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRequest {
    pub fields: Map<String, Value>,
}

impl From<WireRecord> for BillingRecord {
    fn from(wire: WireRecord) -> Self {
        let fields: FieldMap = wire
            .fields
            .into_iter()
            .map(|(name, value)| (name, FieldValue::from(value)))
            .collect();
        BillingRecord::new(wire.id, fields)
    }
}

impl From<ListResponse> for RecordPage {
    fn from(response: ListResponse) -> Self {
        RecordPage {
            records: response.records.into_iter().map(BillingRecord::from).collect(),
            next_cursor: response.offset,
        }
    }
}

pub(crate) fn update_body(fields: &FieldMap) -> UpdateRequest {
    UpdateRequest {
        fields: fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    }
}

/// Query string for one list request
pub(crate) fn list_params(query: &RecordQuery, cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = query
        .fields
        .iter()
        .map(|field| ("fields[]", field.clone()))
        .collect();
    if !query.filter_formula.is_empty() {
        params.push(("filterByFormula", query.filter_formula.clone()));
    }
    params.push(("pageSize", query.page_size.to_string()));
    if let Some(offset) = cursor.filter(|c| !c.is_empty()) {
        params.push(("offset", offset.to_string()));
    }
    params
}

/// Airtable reports errors as `{"error": {"type", "message"}}` or `{"error": "TYPE"}`
pub(crate) fn parse_error(body: &str) -> ErrorDetail {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());
    match error {
        Some(Value::String(kind)) => ErrorDetail {
            message: kind.clone(),
            code: Some(kind),
            retry_after_secs: None,
        },
        Some(Value::Object(obj)) => {
            let kind = obj.get("type").and_then(Value::as_str).map(str::to_string);
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| kind.clone())
                .unwrap_or_default();
            ErrorDetail {
                message,
                code: kind,
                retry_after_secs: None,
            }
        }
        _ => ErrorDetail {
            message: body.trim().chars().take(200).collect(),
            ..Default::default()
        },
    }
}

/// Ledger adapter for one Airtable base
#[derive(Debug, Clone)]
pub struct AirtableLedgerAdapter {
    client: Client,
    config: ExternalSystemConfig,
    base_id: String,
    health_table: Option<String>,
}

impl AirtableLedgerAdapter {
    pub fn new(config: ExternalSystemConfig, base_id: impl Into<String>) -> Result<Self, PortError> {
        Ok(Self {
            client: build_client(&config)?,
            config,
            base_id: base_id.into(),
            health_table: None,
        })
    }

    /// Table read with `pageSize=1` by the health check
    pub fn with_health_table(mut self, table: impl Into<String>) -> Self {
        self.health_table = Some(table.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        join_url(&self.config.base_url, &[self.base_id.as_str(), table])
    }

    fn record_url(&self, table: &str, record_id: &RecordId) -> String {
        join_url(&self.config.base_url, &[self.base_id.as_str(), table, record_id.as_str()])
    }
}

impl DomainPort for AirtableLedgerAdapter {}

#[async_trait]
impl HealthCheckable for AirtableLedgerAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let Some(table) = self.health_table.as_deref() else {
            return HealthCheckResult::unknown(SERVICE, "no table configured for health checks");
        };

        let query = RecordQuery {
            table: table.to_string(),
            fields: Vec::new(),
            filter_formula: String::new(),
            page_size: 1,
        };
        HealthCheckResult::from_probe(SERVICE, started, self.list_records(&query, None).await)
    }
}

#[async_trait]
impl LedgerPort for AirtableLedgerAdapter {
    #[instrument(skip(self, query, cursor), fields(table = %query.table, cursor = ?cursor))]
    async fn list_records(
        &self,
        query: &RecordQuery,
        cursor: Option<&str>,
    ) -> Result<RecordPage, PortError> {
        let request = self
            .client
            .get(self.table_url(&query.table))
            .query(&list_params(query, cursor));
        let response = authorize(request, &self.config.auth)
            .send()
            .await
            .map_err(|e| transport_error(e, "list records", self.config.timeout_ms))?;

        let body: ListResponse = read_json(
            response,
            SERVICE,
            "list records",
            self.config.timeout_ms,
            parse_error,
        )
        .await?;
        debug!(records = body.records.len(), more = body.offset.is_some(), "listed records");
        Ok(body.into())
    }

    #[instrument(skip(self, record_id, fields), fields(record_id = %record_id))]
    async fn update_fields(
        &self,
        table: &str,
        record_id: &RecordId,
        fields: &FieldMap,
    ) -> Result<(), PortError> {
        let request = self
            .client
            .patch(self.record_url(table, record_id))
            .json(&update_body(fields));
        let response = authorize(request, &self.config.auth)
            .send()
            .await
            .map_err(|e| transport_error(e, "update record", self.config.timeout_ms))?;

        let _: Value = read_json(
            response,
            SERVICE,
            "update record",
            self.config.timeout_ms,
            parse_error,
        )
        .await?;
        Ok(())
    }
}
