//! Operational metrics about the exporter itself.
//!
//! # Metrics
//! - `xray_exporter_cycles_total` (counter): cycles by outcome
//! - `xray_exporter_cycle_duration_seconds` (histogram): wall time per cycle
//! - `xray_exporter_traces_listed_total` (counter): ids returned by listings
//! - `xray_exporter_traces_aggregated_total` (counter): traces folded into state
//! - `xray_exporter_traces_malformed_total` (counter): traces skipped by the processor
//! - `xray_exporter_batches_dropped_total` (counter): batches lost after retries
//! - `xray_exporter_batches_abandoned_total` (counter): batches cut by the cycle deadline
//! - `xray_exporter_backend_retries_total` (counter): retries by backend operation
//! - `xray_exporter_persist_failures_total` (counter): failed snapshot writes by file
//! - `xray_exporter_ledger_entries` (gauge): remembered trace ids

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe every self-metric.
///
/// Returns `None` when a recorder is already installed (e.g. a second server
/// in the same process).
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Self-metrics recorder not installed");
            return None;
        }
    };

    describe_counter!("xray_exporter_cycles_total", "Polling cycles by outcome");
    describe_histogram!(
        "xray_exporter_cycle_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of one polling cycle"
    );
    describe_counter!("xray_exporter_traces_listed_total", "Trace ids returned by window listings");
    describe_counter!(
        "xray_exporter_traces_aggregated_total",
        "Traces folded into the metric state"
    );
    describe_counter!(
        "xray_exporter_traces_malformed_total",
        "Traces skipped because required fields were missing"
    );
    describe_counter!(
        "xray_exporter_batches_dropped_total",
        "Detail batches dropped after exhausting retries"
    );
    describe_counter!(
        "xray_exporter_batches_abandoned_total",
        "Detail batches abandoned at the cycle deadline"
    );
    describe_counter!("xray_exporter_backend_retries_total", "Retried backend calls by operation");
    describe_counter!(
        "xray_exporter_persist_failures_total",
        "Failed state snapshot writes by file"
    );
    describe_gauge!("xray_exporter_ledger_entries", "Trace ids currently remembered");

    Some(handle)
}

pub fn record_cycle(outcome: &'static str, elapsed: Duration) {
    counter!("xray_exporter_cycles_total", "outcome" => outcome).increment(1);
    histogram!("xray_exporter_cycle_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_traces_listed(count: usize) {
    counter!("xray_exporter_traces_listed_total").increment(count as u64);
}

pub fn record_traces_aggregated(count: usize) {
    counter!("xray_exporter_traces_aggregated_total").increment(count as u64);
}

pub fn record_malformed_trace() {
    counter!("xray_exporter_traces_malformed_total").increment(1);
}

pub fn record_batch_dropped() {
    counter!("xray_exporter_batches_dropped_total").increment(1);
}

pub fn record_batches_abandoned(count: usize) {
    counter!("xray_exporter_batches_abandoned_total").increment(count as u64);
}

pub fn record_backend_retry(operation: &'static str) {
    counter!("xray_exporter_backend_retries_total", "operation" => operation).increment(1);
}

pub fn record_persist_failure(file: &'static str) {
    counter!("xray_exporter_persist_failures_total", "file" => file).increment(1);
}

pub fn record_ledger_size(entries: usize) {
    gauge!("xray_exporter_ledger_entries").set(entries as f64);
}
