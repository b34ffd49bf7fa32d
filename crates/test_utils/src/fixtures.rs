//! Pre-built Test Fixtures
//!
//! Consistent column names, instants and configurations shared by the
//! billing test suites.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::Timezone;
use domain_billing::{AggregationMode, FieldBindings, ReconcilerConfig};

/// Column names used by every fixture record
pub struct Columns;

impl Columns {
    pub const CUSTOMER: &'static str = "Stripe Customer";
    pub const AMOUNT: &'static str = "Amount";
    pub const PAID: &'static str = "Paid";
    pub const NOTES: &'static str = "Notes";
    pub const CURRENCY: &'static str = "Currency";
    pub const BILLING_DATE: &'static str = "Bill Date";
    pub const SERVICE_DATE: &'static str = "Service Date";
    pub const QUANTITY: &'static str = "Quantity";
    pub const ITEM_DESCRIPTION: &'static str = "Item";
    pub const PROPERTY_LABEL: &'static str = "Property";
}

/// Fixture for field bindings
pub struct FieldFixtures;

impl FieldFixtures {
    /// Lump-sum bindings
    pub fn bindings() -> FieldBindings {
        FieldBindings {
            customer_id: Columns::CUSTOMER.to_string(),
            amount: Columns::AMOUNT.to_string(),
            paid: Columns::PAID.to_string(),
            notes: Columns::NOTES.to_string(),
            currency: Columns::CURRENCY.to_string(),
            billing_date: Columns::BILLING_DATE.to_string(),
            service_date: None,
            quantity: None,
            item_description: None,
            property_label: None,
        }
    }

    /// Bindings with all itemized columns set
    pub fn itemized_bindings() -> FieldBindings {
        FieldBindings {
            service_date: Some(Columns::SERVICE_DATE.to_string()),
            quantity: Some(Columns::QUANTITY.to_string()),
            item_description: Some(Columns::ITEM_DESCRIPTION.to_string()),
            property_label: Some(Columns::PROPERTY_LABEL.to_string()),
            ..Self::bindings()
        }
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The instant every pass in the suites runs at: 2024-03-10 18:00 UTC
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    /// Local calendar date of [`Self::now`] in UTC
    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    /// A date `days` away from [`Self::today`]
    pub fn days_from_today(days: i64) -> NaiveDate {
        Self::today() + chrono::Duration::days(days)
    }

    pub fn utc() -> Timezone {
        Timezone::default()
    }

    pub fn chicago() -> Timezone {
        Timezone::new(chrono_tz::America::Chicago)
    }
}

/// Fixture for reconciler configurations
pub struct ConfigFixtures;

impl ConfigFixtures {
    pub const TABLE: &'static str = "Invoices";

    /// Lump-sum mode in UTC with no inter-group delay
    pub fn lump_sum() -> ReconcilerConfig {
        ReconcilerConfig::new(Self::TABLE, FieldFixtures::bindings(), TemporalFixtures::utc())
            .with_write_delay(Duration::ZERO)
            .with_poll_interval(Duration::from_millis(10))
    }

    /// Itemized mode in UTC with no inter-group delay
    pub fn itemized() -> ReconcilerConfig {
        ReconcilerConfig::new(
            Self::TABLE,
            FieldFixtures::itemized_bindings(),
            TemporalFixtures::utc(),
        )
        .with_mode(AggregationMode::Itemized)
        .with_write_delay(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(10))
    }
}
