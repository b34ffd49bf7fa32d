//! Ports and Adapters Infrastructure
//!
//! The reconciler talks to two systems it does not own: the ledger that
//! stores billing records and the payment processor that holds cards and
//! money. Each is reached through a port trait defined in the billing
//! domain; adapters implement those traits over HTTP or in memory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Reconciliation Loop                        │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                         │
//!                    ▼                         ▼
//!            ┌──────────────┐         ┌──────────────────────┐
//!            │  LedgerPort  │         │ PaymentProcessorPort │
//!            └──────────────┘         └──────────────────────┘
//!               ▲        ▲               ▲            ▲
//!        ┌──────┴───┐ ┌──┴──────┐  ┌─────┴────┐ ┌─────┴──────┐
//!        │ Airtable │ │ InMemory│  │  Stripe  │ │ Scripted   │
//!        └──────────┘ └─────────┘  └──────────┘ └────────────┘
//! ```
//!
//! All adapters report failures as [`PortError`] so the domain can decide
//! what is transient without knowing about HTTP.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a ledger or processor adapter
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} does not exist")]
    NotFound { entity_type: String, id: String },

    /// Request payload refused, e.g. an unknown ledger column
    #[error("invalid request: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Understood but declined, e.g. a card decline; `message` is the
    /// processor's own wording and ends up in the ledger note
    #[error("{message}")]
    Rejected {
        message: String,
        code: Option<String>,
    },

    #[error("cannot reach remote system: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("{operation} gave up after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("credentials refused: {message}")]
    Unauthorized { message: String },

    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// Response body did not have the expected shape
    #[error("unreadable response: {message}")]
    Transformation { message: String },

    #[error("unexpected failure: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        PortError::Rejected {
            message: message.into(),
            code: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    /// Failures that say nothing about the request itself
    ///
    /// The next pass may succeed without anyone changing the ledger.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::RateLimited { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
pub trait DomainPort: Send + Sync + 'static {}

/// Connection settings for an HTTP-based adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSystemConfig {
    pub base_url: String,
    pub auth: ExternalAuthConfig,
    /// Per-request timeout
    pub timeout_ms: u64,
}

impl ExternalSystemConfig {
    /// Settings with a 30 second request timeout
    pub fn new(base_url: impl Into<String>, auth: ExternalAuthConfig) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            timeout_ms: 30_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// How an adapter authenticates; both remote systems take an API key as a
/// bearer token
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalAuthConfig {
    None,
    BearerToken {
        #[serde(skip_serializing)]
        token: String,
    },
}

impl fmt::Debug for ExternalAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalAuthConfig::None => f.write_str("None"),
            ExternalAuthConfig::BearerToken { .. } => f.write_str("BearerToken { token: *** }"),
        }
    }
}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Reachable in principle but failing transiently
    Degraded,
    /// Failing in a way retries will not fix, e.g. a revoked key
    Unhealthy,
    /// Not probed
    Unknown,
}

/// Result of one adapter probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Classifies the outcome of a probe started at `started`
    pub fn from_probe<T>(adapter_id: &str, started: Instant, probe: Result<T, PortError>) -> Self {
        let (status, message) = match probe {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) if e.is_transient() => (AdapterHealth::Degraded, Some(e.to_string())),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };
        Self {
            adapter_id: adapter_id.to_string(),
            status,
            latency_ms: started.elapsed().as_millis() as u64,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy(adapter_id: &str, message: impl Into<String>) -> Self {
        Self::unprobed(adapter_id, AdapterHealth::Healthy, message)
    }

    pub fn unknown(adapter_id: &str, message: impl Into<String>) -> Self {
        Self::unprobed(adapter_id, AdapterHealth::Unknown, message)
    }

    fn unprobed(adapter_id: &str, status: AdapterHealth, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.to_string(),
            status,
            latency_ms: 0,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
