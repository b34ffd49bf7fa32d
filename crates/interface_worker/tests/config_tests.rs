//! Worker configuration loading and resolution

use std::time::Duration;

use core_kernel::ExternalAuthConfig;
use domain_billing::AggregationMode;
use interface_worker::{ConfigError, LogFormat, WorkerConfig};

fn base() -> Vec<(String, String)> {
    [
        ("AIRTABLE_API_KEY", "key_abc"),
        ("AIRTABLE_BASE_ID", "appXYZ"),
        ("TABLENAME", "Cleaning Invoices"),
        ("STRIPE_API_KEY", "sk_test_123"),
        ("STRIPE_CUSTOMER_ID_COLUMN", "Stripe Customer"),
        ("INVOICE_AMOUNT_COLUMN", "Amount"),
        ("PAID_COLUMN", "Paid"),
        ("NOTES_COLUMN", "Notes"),
        ("CURRENCY_CODE_COLUMN", "Currency"),
        ("DATE_COLUMN", "Bill Date"),
        ("TIMEZONE", "America/Chicago"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn with(overrides: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut vars = base();
    for (key, value) in overrides {
        vars.retain(|(k, _)| k != key);
        vars.push((key.to_string(), value.to_string()));
    }
    vars
}

mod resolution {
    use super::*;

    #[test]
    fn test_resolves_lump_sum_config() {
        let resolved = WorkerConfig::from_vars(base())
            .unwrap()
            .reconciler_config()
            .unwrap();

        assert_eq!(resolved.table, "Cleaning Invoices");
        assert_eq!(resolved.fields.customer_id, "Stripe Customer");
        assert_eq!(resolved.fields.billing_date, "Bill Date");
        assert_eq!(resolved.timezone.name(), "America/Chicago");
        assert_eq!(resolved.window.stale_days, -7);
        assert_eq!(resolved.poll_interval, Duration::from_secs(60));
        assert_eq!(resolved.write_delay, Duration::from_millis(1000));
        assert_eq!(resolved.charge_description, "Cleaning/Product Replacement Charge");
        assert_eq!(resolved.mode, AggregationMode::LumpSum);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = WorkerConfig::from_vars(with(&[
            ("STALE_DAYS", "-3"),
            ("POLL_INTERVAL", "15"),
            ("PAGE_SIZE", "50"),
            ("WRITE_DELAY_MS", "0"),
            ("INVOICE_DAYS_UNTIL_DUE", "14"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);

        let resolved = config.reconciler_config().unwrap();
        assert_eq!(resolved.window.stale_days, -3);
        assert_eq!(resolved.poll_interval, Duration::from_secs(15));
        assert_eq!(resolved.page_size, 50);
        assert!(resolved.write_delay.is_zero());
        assert_eq!(resolved.invoice_terms.days_until_due, 14);
    }

    #[test]
    fn test_itemized_mode_with_columns() {
        let resolved = WorkerConfig::from_vars(with(&[
            ("BILLING_MODE", "itemized"),
            ("SERVICE_DATE_COLUMN", "Service Date"),
            ("QUANTITY_COLUMN", "Qty"),
            ("ITEM_DESCRIPTION_COLUMN", "Item"),
            ("PROPERTY_LABEL_COLUMN", "Property"),
        ]))
        .unwrap()
        .reconciler_config()
        .unwrap();

        assert_eq!(resolved.mode, AggregationMode::Itemized);
        assert!(resolved.fields.itemized().is_some());
    }

    #[test]
    fn test_system_configs_carry_keys_and_timeout() {
        let config = WorkerConfig::from_vars(with(&[("REQUEST_TIMEOUT_SECS", "10")])).unwrap();

        let stripe = config.stripe_system();
        assert_eq!(stripe.base_url, "https://api.stripe.com/v1");
        assert_eq!(stripe.timeout_ms, 10_000);
        assert!(matches!(
            stripe.auth,
            ExternalAuthConfig::BearerToken { ref token } if token == "sk_test_123"
        ));

        let airtable = config.airtable_system();
        assert!(matches!(
            airtable.auth,
            ExternalAuthConfig::BearerToken { ref token } if token == "key_abc"
        ));
    }
}

mod rejection {
    use super::*;

    #[test]
    fn test_unknown_timezone_is_fatal() {
        let err = WorkerConfig::from_vars(with(&[("TIMEZONE", "Mars/Olympus_Mons")]))
            .unwrap()
            .reconciler_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimezone(ref tz) if tz == "Mars/Olympus_Mons"));
    }

    #[test]
    fn test_positive_stale_days_rejected() {
        let err = WorkerConfig::from_vars(with(&[("STALE_DAYS", "5")]))
            .unwrap()
            .reconciler_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_stale_days_beyond_ten_years_rejected() {
        let err = WorkerConfig::from_vars(with(&[("STALE_DAYS", "-200000000000000")]))
            .unwrap()
            .reconciler_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_) | ConfigError::Inconsistent(_)));

        let resolved = WorkerConfig::from_vars(with(&[("STALE_DAYS", "-3650")]))
            .unwrap()
            .reconciler_config()
            .unwrap();
        assert_eq!(resolved.window.stale_days, -3650);
    }

    #[test]
    fn test_page_size_above_ledger_maximum_rejected() {
        let err = WorkerConfig::from_vars(with(&[("PAGE_SIZE", "150")]))
            .unwrap()
            .reconciler_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = WorkerConfig::from_vars(with(&[("POLL_INTERVAL", "0")]))
            .unwrap()
            .reconciler_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_itemized_without_columns_rejected() {
        let err = WorkerConfig::from_vars(with(&[
            ("BILLING_MODE", "itemized"),
            ("SERVICE_DATE_COLUMN", "Service Date"),
        ]))
        .unwrap()
        .reconciler_config()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn test_unknown_billing_mode_fails_to_load() {
        assert!(matches!(
            WorkerConfig::from_vars(with(&[("BILLING_MODE", "weekly")])),
            Err(ConfigError::Load(_))
        ));
    }
}
