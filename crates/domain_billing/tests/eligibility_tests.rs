//! Record eligibility rules and their ordering

use proptest::prelude::*;
use rust_decimal_macros::dec;

use domain_billing::{RecordValidator, SkipReason};
use test_utils::{
    assert_minor_units, eligible_day_offset_strategy, future_day_offset_strategy,
    non_positive_amount_strategy, positive_amount_strategy, stale_day_offset_strategy,
    unsupported_currency_strategy, BillingRecordBuilder, Columns, ConfigFixtures, TemporalFixtures,
};

fn validator() -> RecordValidator {
    RecordValidator::new(&ConfigFixtures::lump_sum())
}

mod rule_order {
    use super::*;

    #[test]
    fn test_paid_flag_wins_over_every_other_problem() {
        let record = BillingRecordBuilder::new("rec1")
            .paid("true")
            .without(Columns::BILLING_DATE)
            .currency("eur")
            .build();

        assert_eq!(
            validator().validate(&record, TemporalFixtures::now()),
            Err(SkipReason::AlreadyPaid)
        );
    }

    #[test]
    fn test_paid_false_is_not_settled_for_the_validator() {
        let record = BillingRecordBuilder::new("rec1").paid("false").build();
        assert!(validator().validate(&record, TemporalFixtures::now()).is_ok());
    }

    #[test]
    fn test_missing_date_is_skipped_not_defaulted() {
        let record = BillingRecordBuilder::new("rec1").without(Columns::BILLING_DATE).build();

        let reason = validator().validate(&record, TemporalFixtures::now()).unwrap_err();
        assert!(matches!(reason, SkipReason::MissingField { ref field } if field == Columns::BILLING_DATE));
    }

    #[test]
    fn test_date_is_checked_before_customer() {
        let record = BillingRecordBuilder::new("rec1")
            .billed_days_ago(-3)
            .without(Columns::CUSTOMER)
            .build();

        let reason = validator().validate(&record, TemporalFixtures::now()).unwrap_err();
        assert!(matches!(reason, SkipReason::NotYetDue { .. }));
    }

    #[test]
    fn test_blank_customer_is_missing() {
        let record = BillingRecordBuilder::new("rec1").customer("   ").build();

        let reason = validator().validate(&record, TemporalFixtures::now()).unwrap_err();
        assert!(matches!(reason, SkipReason::MissingField { .. } | SkipReason::InvalidField { .. }));
    }

    #[test]
    fn test_currency_code_is_case_insensitive() {
        let record = BillingRecordBuilder::new("rec1").currency("USD").build();
        assert!(validator().validate(&record, TemporalFixtures::now()).is_ok());
    }

    #[test]
    fn test_amounts_are_kept_exact() {
        let record = BillingRecordBuilder::new("rec1").amount(dec!(12.50)).build();

        let item = validator().validate(&record, TemporalFixtures::now()).unwrap();
        assert_minor_units(&item.amount, 1250);
        assert_eq!(item.billing_date, TemporalFixtures::days_from_today(-2));
    }

    #[test]
    fn test_today_is_already_due() {
        let record = BillingRecordBuilder::new("rec1").billed_days_ago(0).build();
        assert!(validator().validate(&record, TemporalFixtures::now()).is_ok());
    }

    #[test]
    fn test_seven_days_back_is_stale() {
        let record = BillingRecordBuilder::new("rec1").billed_days_ago(7).build();

        let reason = validator().validate(&record, TemporalFixtures::now()).unwrap_err();
        assert!(matches!(reason, SkipReason::TooStale { .. }));
    }
}

proptest! {
    #[test]
    fn prop_non_usd_is_always_skipped(code in unsupported_currency_strategy(), amount in positive_amount_strategy()) {
        let record = BillingRecordBuilder::new("rec1").currency(&code).amount(amount).build();

        let result = validator().validate(&record, TemporalFixtures::now());
        prop_assert!(matches!(result, Err(SkipReason::UnsupportedCurrency { .. })), "expected SkipReason::UnsupportedCurrency");
    }

    #[test]
    fn prop_non_positive_amounts_are_skipped(amount in non_positive_amount_strategy()) {
        let record = BillingRecordBuilder::new("rec1").amount(amount).build();

        let result = validator().validate(&record, TemporalFixtures::now());
        prop_assert!(matches!(result, Err(SkipReason::NonPositiveAmount { .. })), "expected SkipReason::NonPositiveAmount");
    }

    #[test]
    fn prop_dates_inside_the_window_are_eligible(offset in eligible_day_offset_strategy()) {
        let record = BillingRecordBuilder::new("rec1")
            .billing_date(TemporalFixtures::days_from_today(offset))
            .build();

        prop_assert!(validator().validate(&record, TemporalFixtures::now()).is_ok());
    }

    #[test]
    fn prop_future_dates_are_not_yet_due(offset in future_day_offset_strategy()) {
        let record = BillingRecordBuilder::new("rec1")
            .billing_date(TemporalFixtures::days_from_today(offset))
            .build();

        let result = validator().validate(&record, TemporalFixtures::now());
        prop_assert!(matches!(result, Err(SkipReason::NotYetDue { .. })), "expected SkipReason::NotYetDue");
    }

    #[test]
    fn prop_old_dates_are_stale(offset in stale_day_offset_strategy()) {
        let record = BillingRecordBuilder::new("rec1")
            .billing_date(TemporalFixtures::days_from_today(offset))
            .build();

        let result = validator().validate(&record, TemporalFixtures::now());
        prop_assert!(matches!(result, Err(SkipReason::TooStale { .. })), "expected SkipReason::TooStale");
    }

    #[test]
    fn prop_eligibility_only_grows_as_time_passes(offset in -10i64..=10i64, hours in 0i64..=72i64) {
        let record = BillingRecordBuilder::new("rec1")
            .billing_date(TemporalFixtures::days_from_today(offset))
            .build();
        let earlier = TemporalFixtures::now();
        let later = earlier + chrono::Duration::hours(hours);

        let not_due_later = matches!(
            validator().validate(&record, later),
            Err(SkipReason::NotYetDue { .. })
        );
        let not_due_earlier = matches!(
            validator().validate(&record, earlier),
            Err(SkipReason::NotYetDue { .. })
        );
        prop_assert!(!not_due_later || not_due_earlier);
    }
}
