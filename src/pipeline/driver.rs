//! Cycle driver.
//!
//! Owns the ledger and the aggregator and runs one fetch → process →
//! aggregate → persist → publish cycle per interval. Cycles never overlap: a
//! cycle that overruns delays the next tick instead.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::{TimeWindow, TraceBackend};
use crate::config::{CollectorConfig, ExporterConfig};
use crate::health::HealthState;
use crate::observability::metrics;
use crate::pipeline::aggregator::{Aggregator, MetricsSnapshot};
use crate::pipeline::fetcher::{FetchError, TraceFetcher};
use crate::pipeline::ledger::TraceLedger;
use crate::pipeline::processor::process;
use crate::pipeline::window::{next_window, WindowState};
use crate::storage::StateStore;

/// Latest published snapshot, shared with the exposition endpoint.
pub type SnapshotHandle = Arc<ArcSwap<MetricsSnapshot>>;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Counts describing one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub window: TimeWindow,
    pub listed: usize,
    pub fetched: usize,
    pub aggregated: usize,
    pub malformed: usize,
    pub without_entry: usize,
    pub duplicates: usize,
    pub already_seen: usize,
    pub deferred: usize,
    pub batches_dropped: usize,
    pub batches_abandoned: usize,
}

pub struct Collector {
    collector: CollectorConfig,
    fetcher: TraceFetcher,
    ledger: TraceLedger,
    aggregator: Aggregator,
    window: Option<WindowState>,
    store: StateStore,
    snapshots: SnapshotHandle,
    health: Arc<HealthState>,
}

impl Collector {
    /// Build the driver, restoring ledger, counters and window end from the
    /// data directory. The restored counters are published immediately so
    /// the first scrape after a restart already shows prior history.
    pub fn restore(config: &ExporterConfig, backend: Arc<dyn TraceBackend>, health: Arc<HealthState>) -> Self {
        let store = StateStore::new(&config.storage.data_dir);
        let ledger = TraceLedger::load_from(&store, &config.ledger);
        let aggregator = Aggregator::load_from(&store, config.aggregation.max_client_ips_per_service);
        let window = WindowState::load_from(&store);

        metrics::record_ledger_size(ledger.len());
        let snapshots = Arc::new(ArcSwap::from_pointee(aggregator.snapshot()));

        Self {
            collector: config.collector.clone(),
            fetcher: TraceFetcher::new(backend, config),
            ledger,
            aggregator,
            window,
            store,
            snapshots,
            health,
        }
    }

    pub fn snapshots(&self) -> SnapshotHandle {
        Arc::clone(&self.snapshots)
    }

    pub fn ledger(&self) -> &TraceLedger {
        &self.ledger
    }

    pub fn last_window_end(&self) -> Option<u64> {
        self.window.map(|w| w.last_end)
    }

    /// Run one cycle for the window ending now.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, CycleError> {
        self.run_cycle_at(unix_now()).await
    }

    /// Run one cycle for the window ending at `now` (Unix seconds).
    ///
    /// A failed listing aborts the cycle: nothing is aggregated, published or
    /// persisted, and the window does not advance.
    pub async fn run_cycle_at(&mut self, now: u64) -> Result<CycleSummary, CycleError> {
        let started = Instant::now();
        let deadline_after = self.collector.cycle_deadline();
        let window = next_window(now, self.last_window_end(), &self.collector);
        let force_full = self.collector.force_full_collection;

        tracing::debug!(window = %window, force_full, "Starting cycle");

        let outcome = match self
            .fetcher
            .fetch(window, &self.ledger, force_full, started + deadline_after)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(window = %window, error = %e, "Cycle failed");
                self.health.record_failed(e.to_string());
                metrics::record_cycle("failed", started.elapsed());
                return Err(e.into());
            }
        };

        let mut malformed = 0;
        let mut without_entry = 0;
        let fetched = outcome.traces.len();
        let records = outcome
            .traces
            .iter()
            .filter_map(|trace| match process(trace) {
                Ok(Some(record)) => Some(record),
                Ok(None) => {
                    without_entry += 1;
                    None
                }
                Err(e) => {
                    tracing::warn!(trace_id = %trace.id, error = %e, "Skipping malformed trace");
                    metrics::record_malformed_trace();
                    malformed += 1;
                    None
                }
            })
            .collect();

        let report = self.aggregator.apply_cycle(records, &mut self.ledger, now, force_full);
        self.window = Some(WindowState { last_end: window.end });

        self.persist();
        self.snapshots.store(Arc::new(self.aggregator.snapshot()));

        let elapsed = started.elapsed();
        self.health.record_completed(report.cycle, elapsed, deadline_after);
        metrics::record_cycle(
            if elapsed <= deadline_after { "completed" } else { "overran" },
            elapsed,
        );

        let summary = CycleSummary {
            cycle: report.cycle,
            window,
            listed: outcome.listed,
            fetched,
            aggregated: report.aggregated,
            malformed,
            without_entry,
            duplicates: report.duplicates,
            already_seen: outcome.already_seen + report.already_seen,
            deferred: outcome.deferred,
            batches_dropped: outcome.batches_dropped,
            batches_abandoned: outcome.batches_abandoned,
        };

        tracing::info!(
            cycle = summary.cycle,
            window = %window,
            listed = summary.listed,
            aggregated = summary.aggregated,
            malformed = summary.malformed,
            already_seen = summary.already_seen,
            batches_dropped = summary.batches_dropped,
            batches_abandoned = summary.batches_abandoned,
            ledger = self.ledger.len(),
            elapsed = ?elapsed,
            "Cycle complete"
        );

        Ok(summary)
    }

    /// Write ledger, counters and window end. Failures are logged; in-memory
    /// state keeps serving scrapes.
    pub fn persist(&self) {
        if let Err(e) = self.ledger.persist_to(&self.store) {
            tracing::error!(error = %e, "Failed to persist trace id ledger");
        }
        if let Err(e) = self.aggregator.persist_to(&self.store) {
            tracing::error!(error = %e, "Failed to persist counter state");
        }
        if let Some(window) = self.window {
            if let Err(e) = window.persist_to(&self.store) {
                tracing::error!(error = %e, "Failed to persist window end");
            }
        }
    }

    /// Run cycles until shutdown, then flush state.
    ///
    /// Shutdown may interrupt a cycle only while it is still fetching, before
    /// anything was folded, so the flushed state is always a completed cycle.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.collector.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.collector.interval_secs,
            data_dir = %self.store.dir().display(),
            ledger = self.ledger.len(),
            "Collector started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Flushing state before shutdown");
        self.persist();
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
