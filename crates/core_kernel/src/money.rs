//! Money types with precise decimal arithmetic
//!
//! Ledger amounts arrive in major units (dollars) and the payment processor
//! expects integer minor units (cents). This module owns that conversion so
//! every caller truncates the same way.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currencies the processor can be charged in
///
/// Only USD is billed today. Parsing any other code fails, which the
/// record validator turns into a skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
}

impl Currency {
    /// Minor units per major unit
    pub fn minor_unit_factor(&self) -> Decimal {
        match self {
            Currency::USD => dec!(100),
        }
    }

    /// Lower-case ISO 4217 code, the form the processor API expects
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
        }
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    /// Case and surrounding whitespace are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "usd" => Ok(Currency::USD),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("cannot add {1} to a {0} total")]
    CurrencyMismatch(String, String),

    #[error("currency '{0}' cannot be charged")]
    UnsupportedCurrency(String),

    #[error("amount does not fit in minor units")]
    Overflow,
}

/// An amount in major units (dollars) with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// From an integer count of minor units (cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::from(minor_units) / currency.minor_unit_factor(), currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Converts to processor minor units: multiply, then truncate toward zero
    ///
    /// `12.509` USD becomes `1250`, never `1251`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let scaled = self
            .amount
            .checked_mul(self.currency.minor_unit_factor())
            .ok_or(MoneyError::Overflow)?;
        scaled.trunc().to_i64().ok_or(MoneyError::Overflow)
    }

    /// Sum of two amounts in the same currency
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
