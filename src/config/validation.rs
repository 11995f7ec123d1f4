//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (interval > 0, batch size within backend limit)
//! - Validate addresses and URLs before anything binds or connects
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ExporterConfig → Result<(), Vec<ValidationError>>
//! - Runs before the driver loop starts

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ExporterConfig;

/// Largest batch the backend accepts in one detail request.
pub const MAX_BATCH_SIZE: usize = 5;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ExporterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let collector = &config.collector;
    if collector.interval_secs == 0 {
        errors.push(ValidationError::new("collector.interval_secs", "must be greater than 0"));
    }
    if collector.max_lookback_windows == 0 {
        errors.push(ValidationError::new("collector.max_lookback_windows", "must be at least 1"));
    }
    if collector.interval_secs > 0
        && collector.overlap_secs >= collector.interval_secs * u64::from(collector.max_lookback_windows.max(1))
    {
        errors.push(ValidationError::new(
            "collector.overlap_secs",
            "must be shorter than the maximum lookback",
        ));
    }
    if collector.max_traces_per_cycle == 0 {
        errors.push(ValidationError::new("collector.max_traces_per_cycle", "must be at least 1"));
    }
    if collector.cycle_deadline_secs == Some(0) {
        errors.push(ValidationError::new("collector.cycle_deadline_secs", "must be greater than 0"));
    }

    if config.fetcher.workers == 0 {
        errors.push(ValidationError::new("fetcher.workers", "must be at least 1"));
    }
    if !(1..=MAX_BATCH_SIZE).contains(&config.fetcher.batch_size) {
        errors.push(ValidationError::new(
            "fetcher.batch_size",
            format!("must be between 1 and {}", MAX_BATCH_SIZE),
        ));
    }
    if config.fetcher.request_timeout_secs == 0 {
        errors.push(ValidationError::new("fetcher.request_timeout_secs", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.max_delay_ms < retries.base_delay_ms {
        errors.push(ValidationError::new("retries.max_delay_ms", "must not be below retries.base_delay_ms"));
    }
    if !retries.multiplier.is_finite() || retries.multiplier < 1.0 {
        errors.push(ValidationError::new("retries.multiplier", "must be a finite number >= 1.0"));
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be between 0.0 and 1.0"));
    }

    if config.ledger.max_trace_ids == 0 {
        errors.push(ValidationError::new("ledger.max_trace_ids", "must be at least 1"));
    }

    match url::Url::parse(&config.backend.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "backend.endpoint",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("backend.endpoint", format!("is not a valid URL: {}", e))),
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a valid socket address", config.server.bind_address),
        ));
    }

    if config.storage.data_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("storage.data_dir", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
