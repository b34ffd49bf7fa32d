//! Loosely-typed ledger fields and typed extraction
//!
//! Ledger cells can hold text, numbers, booleans, dates, or a rollup of
//! linked values. [`FieldValue`] captures those shapes as a closed union and
//! [`FieldExtractor`] pulls one typed value out of a record's field map.
//! Absence is never an error at this level; callers decide whether a
//! missing field disqualifies the record.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use core_kernel::{CustomerId, Timezone};

/// Field name to value mapping for one record
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single ledger cell
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(Decimal),
    Bool(bool),
    Date(NaiveDate),
    /// Rollup or linked-record cell, kept in ledger order
    Links(Vec<FieldValue>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Plain-text rendering used for flag comparisons and notes
    ///
    /// Returns `None` for shapes that have no single textual form.
    pub fn as_display_string(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(n.normalize().to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.format(core_kernel::LEDGER_DATE_FORMAT).to_string()),
            FieldValue::Links(_) => None,
        }
    }

    /// Shape name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Date(_) => "date",
            FieldValue::Links(_) => "link list",
        }
    }

    /// Converts back to JSON for ledger writes
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Number(n) => n
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(n.to_string())),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Date(d) => {
                Value::String(d.format(core_kernel::LEDGER_DATE_FORMAT).to_string())
            }
            FieldValue::Links(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => parse_json_number(&n)
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::Text(n.to_string())),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::Links(items.into_iter().map(FieldValue::from).collect())
            }
            // Attachments, collaborators and similar object cells carry no
            // billing meaning; keep their JSON text for diagnostics.
            Value::Object(map) => FieldValue::Text(Value::Object(map).to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

/// Parses a JSON number through its shortest decimal text so `0.1` stays
/// exactly `0.1` instead of picking up binary float noise.
fn parse_json_number(n: &serde_json::Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Why a field could not be read as the requested type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field '{field}' is missing")]
    Missing { field: String },

    #[error("field '{field}' has invalid value: {reason}")]
    Invalid { field: String, reason: String },
}

impl FieldError {
    fn missing(field: &str) -> Self {
        FieldError::Missing {
            field: field.to_string(),
        }
    }

    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        FieldError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing { field } | FieldError::Invalid { field, .. } => field,
        }
    }
}

/// Typed read access over one record's fields
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor<'a> {
    fields: &'a FieldMap,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(fields: &'a FieldMap) -> Self {
        Self { fields }
    }

    /// Raw value, with `Null` treated as absent
    pub fn get(&self, field: &str) -> Option<&'a FieldValue> {
        match self.fields.get(field) {
            None | Some(FieldValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Text form of a scalar cell
    pub fn string(&self, field: &str) -> Result<String, FieldError> {
        let value = self.get(field).ok_or_else(|| FieldError::missing(field))?;
        value
            .as_display_string()
            .ok_or_else(|| FieldError::invalid(field, format!("expected text, found {}", value.kind())))
    }

    /// Non-blank text; blank cells count as missing
    pub fn non_blank_string(&self, field: &str) -> Result<String, FieldError> {
        let text = self.string(field)?;
        if text.trim().is_empty() {
            return Err(FieldError::missing(field));
        }
        Ok(text)
    }

    /// Monetary amount; only numeric cells are accepted
    pub fn amount(&self, field: &str) -> Result<Decimal, FieldError> {
        match self.get(field) {
            None => Err(FieldError::missing(field)),
            Some(FieldValue::Number(n)) => Ok(*n),
            Some(other) => Err(FieldError::invalid(
                field,
                format!("expected number, found {}", other.kind()),
            )),
        }
    }

    /// Positive whole quantity
    pub fn quantity(&self, field: &str) -> Result<u32, FieldError> {
        let n = self.amount(field)?;
        if n.fract() != Decimal::ZERO {
            return Err(FieldError::invalid(field, format!("quantity {} is not a whole number", n)));
        }
        match n.to_u32() {
            Some(q) if q > 0 => Ok(q),
            _ => Err(FieldError::invalid(field, format!("quantity {} is not positive", n))),
        }
    }

    /// Calendar date from a date cell or `YYYY-MM-DD` text
    pub fn date(&self, field: &str, tz: &Timezone) -> Result<NaiveDate, FieldError> {
        match self.get(field) {
            None => Err(FieldError::missing(field)),
            Some(FieldValue::Date(d)) => Ok(*d),
            Some(FieldValue::Text(s)) => tz
                .parse_date(s)
                .map_err(|e| FieldError::invalid(field, e.to_string())),
            Some(other) => Err(FieldError::invalid(
                field,
                format!("expected date, found {}", other.kind()),
            )),
        }
    }

    /// Customer identifier from a plain cell or the first element of a rollup
    ///
    /// Only the first linked value is used; records linking several
    /// customers are not supported.
    pub fn customer_id(&self, field: &str) -> Result<CustomerId, FieldError> {
        let value = self.get(field).ok_or_else(|| FieldError::missing(field))?;
        let raw = match value {
            FieldValue::Links(items) => match items.first() {
                None => return Err(FieldError::missing(field)),
                Some(first @ (FieldValue::Text(_) | FieldValue::Number(_))) => {
                    first.as_display_string()
                }
                Some(other) => {
                    return Err(FieldError::invalid(
                        field,
                        format!("linked value is a {}", other.kind()),
                    ))
                }
            },
            FieldValue::Text(s) => Some(s.clone()),
            other => {
                return Err(FieldError::invalid(
                    field,
                    format!("expected text or link list, found {}", other.kind()),
                ))
            }
        };

        match raw {
            Some(id) if !id.trim().is_empty() => Ok(CustomerId::new(id.trim())),
            _ => Err(FieldError::missing(field)),
        }
    }
}
