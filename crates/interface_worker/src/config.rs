//! Worker configuration
//!
//! Settings come from environment variables (after an optional `.env`
//! file). Keys are the upper-case field names, e.g. `PAID_COLUMN` or
//! `POLL_INTERVAL`. The loaded [`WorkerConfig`] is validated once and
//! resolved into the immutable [`ReconcilerConfig`] the pipeline runs on.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use core_kernel::{CoreError, ExternalAuthConfig, ExternalSystemConfig, Timezone};
use domain_billing::{AggregationMode, FieldBindings, ReconcilerConfig, DEFAULT_CHARGE_DESCRIPTION};

/// Errors that stop the worker from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Unknown time zone '{0}'")]
    InvalidTimezone(String),

    #[error(transparent)]
    Inconsistent(#[from] CoreError),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Raw worker settings
#[derive(Clone, Deserialize, Validate)]
pub struct WorkerConfig {
    #[validate(length(min = 1, message = "AIRTABLE_API_KEY is required"))]
    pub airtable_api_key: String,
    #[validate(length(min = 1, message = "AIRTABLE_BASE_ID is required"))]
    pub airtable_base_id: String,
    #[serde(default = "default_airtable_api_url")]
    pub airtable_api_url: String,
    #[serde(rename = "tablename")]
    #[validate(length(min = 1, message = "TABLENAME is required"))]
    pub table_name: String,

    #[validate(length(min = 1, message = "STRIPE_API_KEY is required"))]
    pub stripe_api_key: String,
    #[serde(default = "default_stripe_api_url")]
    pub stripe_api_url: String,

    #[validate(length(min = 1))]
    pub stripe_customer_id_column: String,
    #[validate(length(min = 1))]
    pub invoice_amount_column: String,
    #[validate(length(min = 1))]
    pub paid_column: String,
    #[validate(length(min = 1))]
    pub notes_column: String,
    #[validate(length(min = 1))]
    pub currency_code_column: String,
    #[validate(length(min = 1))]
    pub date_column: String,
    pub service_date_column: Option<String>,
    pub quantity_column: Option<String>,
    pub item_description_column: Option<String>,
    pub property_label_column: Option<String>,

    #[serde(default = "default_stale_days")]
    #[validate(range(min = -3650, max = 0, message = "STALE_DAYS must be between -3650 and 0"))]
    pub stale_days: i64,
    /// Seconds between passes
    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 1))]
    pub poll_interval: u64,
    #[validate(length(min = 1, message = "TIMEZONE is required"))]
    pub timezone: String,
    #[serde(default)]
    pub billing_mode: AggregationMode,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[serde(default = "default_charge_description")]
    #[validate(length(min = 1))]
    pub charge_description: String,
    #[serde(default = "default_invoice_days_until_due")]
    pub invoice_days_until_due: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_airtable_api_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_stale_days() -> i64 {
    -7
}

fn default_poll_interval() -> u64 {
    60
}

fn default_page_size() -> u32 {
    100
}

fn default_write_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_charge_description() -> String {
    DEFAULT_CHARGE_DESCRIPTION.to_string()
}

fn default_invoice_days_until_due() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WorkerConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Environment::default())
    }

    /// Loads configuration from explicit key/value pairs
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(config::Environment::default().source(Some(map)))
    }

    fn load(source: config::Environment) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(source.try_parsing(true).ignore_empty(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    fn bindings(&self) -> FieldBindings {
        let optional = |column: &Option<String>| {
            column
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        };
        FieldBindings {
            customer_id: self.stripe_customer_id_column.clone(),
            amount: self.invoice_amount_column.clone(),
            paid: self.paid_column.clone(),
            notes: self.notes_column.clone(),
            currency: self.currency_code_column.clone(),
            billing_date: self.date_column.clone(),
            service_date: optional(&self.service_date_column),
            quantity: optional(&self.quantity_column),
            item_description: optional(&self.item_description_column),
            property_label: optional(&self.property_label_column),
        }
    }

    /// Validates and resolves the pipeline configuration
    ///
    /// An unknown time zone is fatal; the worker refuses to start rather
    /// than guess which calendar day a record belongs to.
    pub fn reconciler_config(&self) -> Result<ReconcilerConfig, ConfigError> {
        self.validate()?;

        let timezone = Timezone::from_name(self.timezone.trim())
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))?;

        let mut resolved = ReconcilerConfig::new(self.table_name.clone(), self.bindings(), timezone)
            .with_mode(self.billing_mode)
            .with_stale_days(self.stale_days)
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_write_delay(Duration::from_millis(self.write_delay_ms))
            .with_page_size(self.page_size);
        resolved.charge_description = self.charge_description.clone();
        resolved.invoice_terms.days_until_due = self.invoice_days_until_due;

        resolved.validate()?;
        Ok(resolved)
    }

    pub fn airtable_system(&self) -> ExternalSystemConfig {
        ExternalSystemConfig::new(
            self.airtable_api_url.clone(),
            ExternalAuthConfig::BearerToken {
                token: self.airtable_api_key.clone(),
            },
        )
        .with_timeout_ms(self.request_timeout_secs * 1000)
    }

    pub fn stripe_system(&self) -> ExternalSystemConfig {
        ExternalSystemConfig::new(
            self.stripe_api_url.clone(),
            ExternalAuthConfig::BearerToken {
                token: self.stripe_api_key.clone(),
            },
        )
        .with_timeout_ms(self.request_timeout_secs * 1000)
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("airtable_api_url", &self.airtable_api_url)
            .field("airtable_base_id", &self.airtable_base_id)
            .field("table_name", &self.table_name)
            .field("stripe_api_url", &self.stripe_api_url)
            .field("billing_mode", &self.billing_mode)
            .field("timezone", &self.timezone)
            .field("stale_days", &self.stale_days)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
