//! Time zone and billing-date handling
//!
//! Billing dates in the ledger are calendar dates without a zone. They are
//! interpreted in the configured business time zone: a record dated
//! `2024-03-01` becomes due at local midnight on that day.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Calendar date format used by the ledger
pub const LEDGER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Timezone wrapper for the business calendar
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::from_name(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Resolves an IANA zone name such as `America/New_York`
    pub fn from_name(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name.trim())
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Converts a UTC datetime to the local timezone
    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.0)
    }

    /// The local calendar date at the given instant
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.to_local(now).date_naive()
    }

    /// Gets the start of day (00:00:00) in this timezone as UTC
    ///
    /// When midnight falls inside a DST gap the first valid instant after
    /// the gap is used.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        midnight
            .and_local_timezone(self.0)
            .earliest()
            .or_else(|| (midnight + Duration::hours(1)).and_local_timezone(self.0).earliest())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    /// Parses a ledger calendar date (`YYYY-MM-DD`)
    pub fn parse_date(&self, raw: &str) -> Result<NaiveDate, TemporalError> {
        NaiveDate::parse_from_str(raw.trim(), LEDGER_DATE_FORMAT)
            .map_err(|_| TemporalError::InvalidDate(raw.to_string()))
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Source of "now" for the reconciler
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant, for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Moves the clock to a new instant
    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Where a billing date sits relative to "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEligibility {
    /// The date has started and is inside the trailing window
    Due,
    /// Local midnight of the date has not passed yet
    NotYetDue,
    /// The date is older than the trailing window allows
    Stale,
}

/// Trailing window of billing dates that may still be charged
///
/// `stale_days` is a non-positive day offset: `-7` accepts dates whose
/// local start of day is no earlier than seven days before now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityWindow {
    pub stale_days: i64,
}

impl EligibilityWindow {
    pub fn new(stale_days: i64) -> Self {
        Self { stale_days }
    }

    /// Classifies a billing date against `now` in the given zone
    ///
    /// A window too wide to represent classifies every started date as stale.
    pub fn classify(&self, date: NaiveDate, now: DateTime<Utc>, tz: &Timezone) -> DateEligibility {
        let due_at = tz.start_of_day(date);
        if now <= due_at {
            return DateEligibility::NotYetDue;
        }
        let cutoff = Duration::try_days(self.stale_days).and_then(|offset| now.checked_add_signed(offset));
        match cutoff {
            Some(cutoff) if due_at >= cutoff => DateEligibility::Due,
            _ => DateEligibility::Stale,
        }
    }
}

impl Default for EligibilityWindow {
    fn default() -> Self {
        Self { stale_days: -7 }
    }
}
