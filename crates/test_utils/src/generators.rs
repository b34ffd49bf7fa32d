//! Property-Based Test Generators
//!
//! Proptest strategies for ledger cell values.

use proptest::prelude::*;
use rust_decimal::Decimal;

/// Positive amounts with two decimal places, up to $100,000.00
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Zero or negative amounts
pub fn non_positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (-10_000_000i64..=0i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Lower-case three-letter codes other than `usd`
pub fn unsupported_currency_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3}".prop_filter("usd is supported", |code| code != "usd")
}

/// Day offsets from today that fall inside the default window
pub fn eligible_day_offset_strategy() -> impl Strategy<Value = i64> {
    -6i64..=0i64
}

/// Day offsets after today, which are not yet due
pub fn future_day_offset_strategy() -> impl Strategy<Value = i64> {
    1i64..=365i64
}

/// Day offsets beyond the default staleness bound
pub fn stale_day_offset_strategy() -> impl Strategy<Value = i64> {
    -365i64..=-7i64
}
