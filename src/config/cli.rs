//! Command-line surface.
//!
//! Flags override the corresponding config file values; the merged result is
//! validated once, so an invalid flag is reported the same way as an invalid
//! file entry.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ExporterConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Default, Parser)]
#[command(name = "xray-exporter")]
#[command(about = "Polls an X-Ray-compatible tracing backend and exposes aggregated Prometheus metrics", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port of the metrics endpoint (keeps the configured host)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Full bind address of the metrics endpoint
    #[arg(long)]
    pub bind: Option<String>,

    /// Tracing backend API endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Polling interval and window length, in minutes
    #[arg(long = "time-window")]
    pub time_window: Option<u64>,

    /// Directory for persisted state
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// Concurrent batch requests
    #[arg(long)]
    pub workers: Option<usize>,

    /// Trace ids per batch request (1-5)
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub retry_attempts: Option<u32>,

    #[arg(long)]
    pub max_trace_ids: Option<usize>,

    /// Ledger retention in seconds (0 disables age eviction)
    #[arg(long)]
    pub ledger_retention_secs: Option<u64>,

    /// Ignore the ledger when filtering trace ids (backfill)
    #[arg(long)]
    pub force_full_collection: bool,
}

impl Cli {
    /// Load the config file (or defaults), apply overrides and validate.
    pub fn into_config(self) -> Result<ExporterConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ExporterConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut ExporterConfig) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            let host = config
                .server
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.server.bind_address = format!("{}:{}", host, port);
        }
        if let Some(endpoint) = self.endpoint {
            config.backend.endpoint = endpoint;
        }
        if let Some(minutes) = self.time_window {
            config.collector.interval_secs = minutes.saturating_mul(60);
        }
        if let Some(dir) = self.data_dir {
            config.storage.data_dir = dir;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(workers) = self.workers {
            config.fetcher.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.fetcher.batch_size = batch_size;
        }
        if let Some(attempts) = self.retry_attempts {
            config.retries.max_attempts = attempts;
        }
        if let Some(max) = self.max_trace_ids {
            config.ledger.max_trace_ids = max;
        }
        if let Some(secs) = self.ledger_retention_secs {
            config.ledger.retention_secs = secs;
        }
        if self.force_full_collection {
            config.collector.force_full_collection = true;
        }
    }
}
