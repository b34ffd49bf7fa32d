//! The reconciliation loop
//!
//! One pass walks through fixed stages:
//!
//! ```text
//! Fetching → Validating → Aggregating → Charging → Writing → Sleeping
//! ```
//!
//! Charging and writing alternate per customer group, with a fixed pause
//! between groups. Passes never overlap, and shutdown is observed only
//! between passes or while sleeping.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{Clock, PassId, PortError, SystemClock};

use crate::aggregation::CustomerAggregator;
use crate::charge::{ChargeExecutor, FirstAvailable, PaymentMethodSelector};
use crate::config::ReconcilerConfig;
use crate::error::BillingError;
use crate::outcome::OutcomeWriter;
use crate::ports::{LedgerPort, PaymentProcessorPort, RecordQuery};
use crate::record::BillingRecord;
use crate::validation::RecordValidator;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    Idle,
    Fetching,
    Validating,
    Aggregating,
    Charging,
    Writing,
    Sleeping,
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassStage::Idle => "idle",
            PassStage::Fetching => "fetching",
            PassStage::Validating => "validating",
            PassStage::Aggregating => "aggregating",
            PassStage::Charging => "charging",
            PassStage::Writing => "writing",
            PassStage::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

/// Counts for one completed pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass_id: PassId,
    pub fetched: usize,
    pub pages: usize,
    pub skipped: usize,
    pub eligible: usize,
    pub groups: usize,
    pub charged: usize,
    pub failed: usize,
    pub updates_applied: usize,
    pub updates_failed: usize,
}

impl PassSummary {
    fn new(pass_id: PassId) -> Self {
        Self {
            pass_id,
            fetched: 0,
            pages: 0,
            skipped: 0,
            eligible: 0,
            groups: 0,
            charged: 0,
            failed: 0,
            updates_applied: 0,
            updates_failed: 0,
        }
    }
}

/// Drives passes against a ledger and a payment processor
pub struct Reconciler {
    config: Arc<ReconcilerConfig>,
    ledger: Arc<dyn LedgerPort>,
    processor: Arc<dyn PaymentProcessorPort>,
    clock: Arc<dyn Clock>,
    validator: RecordValidator,
    aggregator: CustomerAggregator,
    executor: ChargeExecutor,
    writer: OutcomeWriter,
    stage: watch::Sender<PassStage>,
}

impl Reconciler {
    /// Creates a reconciler using the wall clock and the first stored card
    pub fn new(
        config: Arc<ReconcilerConfig>,
        ledger: Arc<dyn LedgerPort>,
        processor: Arc<dyn PaymentProcessorPort>,
    ) -> Self {
        let (stage, _) = watch::channel(PassStage::Idle);
        Self {
            validator: RecordValidator::new(&config),
            aggregator: CustomerAggregator::new(config.mode),
            executor: ChargeExecutor::new(processor.clone(), Arc::new(FirstAvailable), &config),
            writer: OutcomeWriter::new(ledger.clone(), config.table.clone(), config.fields.clone()),
            clock: Arc::new(SystemClock),
            config,
            ledger,
            processor,
            stage,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn PaymentMethodSelector>) -> Self {
        self.executor = ChargeExecutor::new(self.processor.clone(), selector, &self.config);
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Subscribes to stage transitions
    pub fn stage(&self) -> watch::Receiver<PassStage> {
        self.stage.subscribe()
    }

    fn enter(&self, stage: PassStage) {
        debug!(%stage, "entering stage");
        self.stage.send_replace(stage);
    }

    fn query(&self) -> RecordQuery {
        RecordQuery {
            table: self.config.table.clone(),
            fields: self.config.fields.fetch_fields(self.config.mode),
            filter_formula: self.config.fields.unsettled_filter(),
            page_size: self.config.page_size,
        }
    }

    /// Reads every unsettled record, following continuation cursors
    ///
    /// A cursor the ledger already handed out aborts the fetch, since its
    /// pages would be aggregated twice.
    pub async fn fetch_all(&self) -> Result<(Vec<BillingRecord>, usize), BillingError> {
        let query = self.query();
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .ledger
                .list_records(&query, cursor.as_deref())
                .await
                .map_err(|source| BillingError::Fetch { page: pages, source })?;
            pages += 1;
            debug!(page = pages, records = page.records.len(), "fetched ledger page");

            let next = page.continuation().map(str::to_string);
            records.extend(page.records);
            match next {
                None => break,
                Some(next) if seen_cursors.contains(&next) => {
                    return Err(BillingError::Fetch {
                        page: pages,
                        source: PortError::transformation(format!(
                            "ledger repeated continuation cursor {}",
                            next
                        )),
                    });
                }
                Some(next) => {
                    seen_cursors.insert(next.clone());
                    cursor = Some(next);
                }
            }
        }

        Ok((records, pages))
    }

    /// Runs one complete pass
    ///
    /// Only a fetch failure is returned as an error; every other problem is
    /// recorded against its record or group and the pass continues.
    pub async fn run_pass(&self) -> Result<PassSummary, BillingError> {
        let result = self.execute_pass(PassId::new()).await;
        self.enter(PassStage::Idle);
        result
    }

    #[instrument(name = "pass", skip(self), fields(pass_id = %pass_id))]
    async fn execute_pass(&self, pass_id: PassId) -> Result<PassSummary, BillingError> {
        let mut summary = PassSummary::new(pass_id);

        self.enter(PassStage::Fetching);
        let (records, pages) = self.fetch_all().await?;
        summary.fetched = records.len();
        summary.pages = pages;

        self.enter(PassStage::Validating);
        let now = self.clock.now();
        let batch = self.validator.validate_batch(&records, now);
        summary.skipped = batch.skipped.len();
        summary.eligible = batch.items.len();

        self.enter(PassStage::Aggregating);
        let groups = self.aggregator.aggregate(batch.items);
        summary.groups = groups.len();

        for (i, group) in groups.iter().enumerate() {
            if i > 0 && !self.config.write_delay.is_zero() {
                tokio::time::sleep(self.config.write_delay).await;
            }

            self.enter(PassStage::Charging);
            let outcome = self.executor.execute(group).await;
            if outcome.is_success() {
                summary.charged += 1;
            } else {
                summary.failed += 1;
            }

            self.enter(PassStage::Writing);
            let written = self.writer.write(group, &outcome).await;
            summary.updates_applied += written.applied;
            summary.updates_failed += written.failed.len();
            if !written.is_complete() {
                warn!(
                    customer_id = %group.customer_id,
                    failed = written.failed.len(),
                    "group only partially written back"
                );
            }
        }

        info!(
            fetched = summary.fetched,
            pages = summary.pages,
            skipped = summary.skipped,
            eligible = summary.eligible,
            groups = summary.groups,
            charged = summary.charged,
            failed = summary.failed,
            updates_applied = summary.updates_applied,
            updates_failed = summary.updates_failed,
            "pass complete"
        );
        Ok(summary)
    }

    /// Runs passes until `shutdown` turns true or its sender is dropped
    ///
    /// Returns the number of passes started.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            table = %self.config.table,
            mode = ?self.config.mode,
            timezone = %self.config.timezone.name(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "reconciler running"
        );

        let mut passes = 0usize;
        loop {
            if *shutdown.borrow() {
                break;
            }

            passes += 1;
            if let Err(e) = self.run_pass().await {
                error!(error = %e, transient = e.is_transient(), "pass aborted");
            }

            self.enter(PassStage::Sleeping);
            if !self.sleep_between_passes(&mut shutdown).await {
                break;
            }
        }

        self.enter(PassStage::Idle);
        info!(passes, "reconciler stopped");
        passes
    }

    /// Sleeps one poll interval; false once shutdown is requested
    ///
    /// Changes that leave the flag false do not cut the sleep short.
    async fn sleep_between_passes(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.poll_interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        return false;
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
