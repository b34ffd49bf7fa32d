//! Unit tests for the Money module
//!
//! Covers minor-unit conversion, currency parsing and checked addition.

use core_kernel::{Money, Currency, MoneyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod minor_units {
    use super::*;

    #[test]
    fn test_lump_sum_example_converts_exactly() {
        let total = Money::new(dec!(12.50), Currency::USD)
            .checked_add(&Money::new(dec!(7.25), Currency::USD))
            .unwrap();
        assert_eq!(total.to_minor_units().unwrap(), 1975);
    }

    #[test]
    fn test_whole_dollars() {
        let m = Money::new(dec!(40), Currency::USD);
        assert_eq!(m.to_minor_units().unwrap(), 4000);
    }

    #[test]
    fn test_truncates_fractional_cents() {
        let m = Money::new(dec!(0.019), Currency::USD);
        assert_eq!(m.to_minor_units().unwrap(), 1);
    }

    #[test]
    fn test_sub_cent_amount_becomes_zero() {
        let m = Money::new(dec!(0.004), Currency::USD);
        assert_eq!(m.to_minor_units().unwrap(), 0);
    }

    #[test]
    fn test_overflow_is_reported() {
        let m = Money::new(Decimal::MAX, Currency::USD);
        assert_eq!(m.to_minor_units(), Err(MoneyError::Overflow));
    }
}

mod addition {
    use super::*;

    #[test]
    fn test_zero_is_the_identity() {
        let m = Money::new(dec!(3.10), Currency::USD);
        assert_eq!(Money::zero(Currency::USD).checked_add(&m).unwrap(), m);
    }

    #[test]
    fn test_overflowing_sum_is_reported() {
        let max = Money::new(Decimal::MAX, Currency::USD);
        assert_eq!(max.checked_add(&max), Err(MoneyError::Overflow));
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_code_is_lowercase() {
        assert_eq!(Currency::USD.code(), "usd");
        assert_eq!(Currency::USD.to_string(), "usd");
    }

    #[test]
    fn test_unsupported_codes_are_errors() {
        for code in ["eur", "GBP", "", "us d"] {
            assert!(code.parse::<Currency>().is_err(), "{code} should not parse");
        }
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&Currency::USD).unwrap();
        assert_eq!(json, "\"usd\"");
    }
}
