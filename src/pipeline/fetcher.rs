//! Trace fetcher.
//!
//! Lists trace ids for a window, filters out what the ledger already holds,
//! and retrieves the rest in batches through a bounded worker pool. A batch
//! that keeps failing is dropped for this cycle; only a failed listing is
//! fatal to the cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use crate::backend::{BackendError, TimeWindow, TraceBackend, TraceSummary};
use crate::config::ExporterConfig;
use crate::observability::metrics;
use crate::pipeline::ledger::TraceLedger;
use crate::resilience::{retry_with_backoff, with_timeout, RetryPolicy};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("listing trace ids for window {window} failed: {source}")]
    Listing {
        window: TimeWindow,
        #[source]
        source: BackendError,
    },
}

/// What one fetch produced, with enough bookkeeping to log the cycle.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub traces: Vec<TraceSummary>,
    /// Ids returned by the listing, duplicates included.
    pub listed: usize,
    /// Ids skipped because the ledger already holds them.
    pub already_seen: usize,
    /// Ids beyond the per-cycle cap, left for a later window.
    pub deferred: usize,
    pub batches: usize,
    pub batches_dropped: usize,
    pub batches_abandoned: usize,
}

pub struct TraceFetcher {
    backend: Arc<dyn TraceBackend>,
    workers: usize,
    batch_size: usize,
    max_traces: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl TraceFetcher {
    pub fn new(backend: Arc<dyn TraceBackend>, config: &ExporterConfig) -> Self {
        Self {
            backend,
            workers: config.fetcher.workers.max(1),
            batch_size: config.fetcher.batch_size.max(1),
            max_traces: config.collector.max_traces_per_cycle.max(1),
            request_timeout: config.fetcher.request_timeout(),
            retry: RetryPolicy::from_config(&config.retries),
        }
    }

    /// Fetch every not-yet-aggregated trace of `window`.
    ///
    /// Batches still outstanding at `deadline` are abandoned. With
    /// `force_full` the ledger is not consulted.
    pub async fn fetch(
        &self,
        window: TimeWindow,
        ledger: &TraceLedger,
        force_full: bool,
        deadline: Instant,
    ) -> Result<FetchOutcome, FetchError> {
        let listed = self
            .list(window, deadline)
            .await
            .map_err(|source| FetchError::Listing { window, source })?;

        let mut outcome = FetchOutcome {
            listed: listed.len(),
            ..FetchOutcome::default()
        };
        metrics::record_traces_listed(listed.len());

        let mut unique = HashSet::with_capacity(listed.len());
        let mut pending = Vec::with_capacity(listed.len());
        for id in listed {
            if !unique.insert(id.clone()) {
                continue;
            }
            if !force_full && ledger.has(&id) {
                outcome.already_seen += 1;
                continue;
            }
            pending.push(id);
        }
        if pending.len() > self.max_traces {
            outcome.deferred = pending.len() - self.max_traces;
            pending.truncate(self.max_traces);
            tracing::info!(
                window = %window,
                cap = self.max_traces,
                deferred = outcome.deferred,
                "Per-cycle trace cap reached"
            );
        }

        let batches: Vec<Vec<String>> = pending.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        outcome.batches = batches.len();

        let mut results = stream::iter(batches)
            .map(|batch| async move {
                let result = retry_with_backoff(&self.retry, "get_trace_detail", || {
                    with_timeout(self.request_timeout, self.backend.get_trace_detail(&batch))
                })
                .await;
                (batch, result)
            })
            .buffer_unordered(self.workers);

        let mut completed = 0;
        loop {
            match tokio::time::timeout_at(deadline, results.next()).await {
                Ok(Some((batch, result))) => {
                    completed += 1;
                    match result {
                        Ok(traces) => {
                            if traces.len() < batch.len() {
                                tracing::debug!(
                                    requested = batch.len(),
                                    returned = traces.len(),
                                    "Batch came back incomplete"
                                );
                            }
                            outcome.traces.extend(traces);
                        }
                        Err(e) => {
                            outcome.batches_dropped += 1;
                            metrics::record_batch_dropped();
                            tracing::warn!(
                                first_trace_id = batch.first().map(String::as_str).unwrap_or_default(),
                                size = batch.len(),
                                error = %e,
                                "Dropping batch after retries"
                            );
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    outcome.batches_abandoned = outcome.batches - completed;
                    metrics::record_batches_abandoned(outcome.batches_abandoned);
                    tracing::warn!(
                        window = %window,
                        abandoned = outcome.batches_abandoned,
                        "Cycle deadline reached, abandoning remaining batches"
                    );
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Listing shares the cycle deadline: every attempt gets whatever time is left.
    async fn list(&self, window: TimeWindow, deadline: Instant) -> Result<Vec<String>, BackendError> {
        retry_with_backoff(&self.retry, "list_trace_ids", || {
            let remaining = deadline.saturating_duration_since(Instant::now());
            with_timeout(remaining, self.backend.list_trace_ids(window))
        })
        .await
    }
}
