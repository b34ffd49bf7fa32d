//! Billing Reconciler - Charger Binary
//!
//! Polls the ledger for unpaid records, charges customers' stored cards
//! (or invoices them, in itemized mode) and writes the outcome back.
//!
//! # Usage
//!
//! ```bash
//! # Run with a local .env file
//! cargo run --bin charger
//!
//! # Run with explicit environment variables
//! TIMEZONE=America/Chicago POLL_INTERVAL=30 LOG_FORMAT=json cargo run --bin charger
//! ```
//!
//! # Environment Variables
//!
//! * `AIRTABLE_API_KEY`, `AIRTABLE_BASE_ID`, `TABLENAME` - Ledger access
//! * `STRIPE_API_KEY` - Payment processor secret key
//! * `*_COLUMN` - Ledger column names for each logical field
//! * `TIMEZONE` - IANA zone that billing dates are interpreted in (required)
//! * `STALE_DAYS` - Oldest billing date still charged, in days (default: -7)
//! * `POLL_INTERVAL` - Seconds between passes (default: 60)
//! * `BILLING_MODE` - `lump_sum` or `itemized` (default: lump_sum)
//! * `LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `LOG_FORMAT` - `text` or `json` (default: text)

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use core_kernel::{AdapterHealth, HealthCheckable};
use domain_billing::Reconciler;
use infra_external::{AirtableLedgerAdapter, StripeProcessorAdapter};
use interface_worker::{init_tracing, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);

    let reconciler_config = config
        .reconciler_config()
        .context("refusing to start with invalid configuration")?;

    let ledger = AirtableLedgerAdapter::new(config.airtable_system(), config.airtable_base_id.clone())
        .context("failed to create ledger client")?
        .with_health_table(reconciler_config.table.clone());
    let processor =
        StripeProcessorAdapter::new(config.stripe_system()).context("failed to create processor client")?;

    report_health(&ledger).await;
    report_health(&processor).await;

    let reconciler = Reconciler::new(
        Arc::new(reconciler_config),
        Arc::new(ledger),
        Arc::new(processor),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(config = ?config, "charger running");
    reconciler.run(shutdown_rx).await;

    tracing::info!("charger shutdown complete");
    Ok(())
}

/// Logs one adapter health check; an unhealthy adapter does not stop startup
async fn report_health(adapter: &dyn HealthCheckable) {
    let result = adapter.health_check().await;
    match result.status {
        AdapterHealth::Healthy => tracing::info!(
            adapter = %result.adapter_id,
            latency_ms = result.latency_ms,
            "adapter healthy"
        ),
        status => tracing::warn!(
            adapter = %result.adapter_id,
            status = ?status,
            message = result.message.as_deref().unwrap_or(""),
            "adapter not healthy at startup"
        ),
    }
}

/// Waits for Ctrl+C or SIGTERM
///
/// The loop finishes its current pass before observing the signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping after the current pass");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current pass");
        }
    }
}
