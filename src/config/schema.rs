//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the exporter.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the exporter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExporterConfig {
    /// Polling cadence and window handling.
    pub collector: CollectorConfig,

    /// Batch retrieval settings.
    pub fetcher: FetcherConfig,

    /// Retry configuration for backend calls.
    pub retries: RetryConfig,

    /// Deduplication ledger bounds.
    pub ledger: LedgerConfig,

    /// Aggregation limits.
    pub aggregation: AggregationConfig,

    /// Tracing backend connection.
    pub backend: BackendConfig,

    /// Persisted state location.
    pub storage: StorageConfig,

    /// Exposition endpoint.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Polling cycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Polling interval in seconds; also the nominal window length.
    pub interval_secs: u64,

    /// Seconds the window start is pulled back to catch late traces.
    pub overlap_secs: u64,

    /// A resumed window never reaches back further than this many intervals.
    pub max_lookback_windows: u32,

    /// Cap on traces fetched per cycle; the excess is left for later windows.
    pub max_traces_per_cycle: usize,

    /// Soft deadline for one cycle in seconds (default: 80% of the interval).
    pub cycle_deadline_secs: Option<u64>,

    /// Ignore the ledger when filtering (backfill); persisted entries are kept.
    pub force_full_collection: bool,
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_deadline(&self) -> Duration {
        match self.cycle_deadline_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.interval().mul_f64(0.8),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            overlap_secs: 5,
            max_lookback_windows: 5,
            max_traces_per_cycle: 10_000,
            cycle_deadline_secs: None,
            force_full_collection: false,
        }
    }
}

/// Batch retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Concurrent batch requests.
    pub workers: usize,

    /// Trace ids per batch request (backend limit is 5).
    pub batch_size: usize,

    /// Timeout for a single backend request in seconds.
    pub request_timeout_secs: u64,
}

impl FetcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            batch_size: 5,
            request_timeout_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per call, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Fraction of the delay added as random jitter (0.1 = up to 10%).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

/// Trace id ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum remembered trace ids; oldest are evicted first.
    pub max_trace_ids: usize,

    /// Entries older than this are evicted (0 disables age eviction).
    pub retention_secs: u64,
}

impl LedgerConfig {
    pub fn retention(&self) -> Option<Duration> {
        (self.retention_secs > 0).then(|| Duration::from_secs(self.retention_secs))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_trace_ids: 1_000_000,
            retention_secs: 24 * 60 * 60,
        }
    }
}

/// Aggregation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Per cycle, only this many of a service's most frequent client IPs are counted.
    pub max_client_ips_per_service: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_client_ips_per_service: 10,
        }
    }
}

/// Tracing backend connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the X-Ray-compatible query API.
    pub endpoint: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:2000".to_string(),
        }
    }
}

/// Persisted state location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the ledger, counter and window snapshots.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Exposition endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9092").
    pub bind_address: String,

    /// Timeout for serving one HTTP request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9092".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Append the exporter's own operational metrics to `/metrics`.
    pub self_metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            self_metrics_enabled: true,
        }
    }
}
