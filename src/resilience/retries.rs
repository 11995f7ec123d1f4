//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed backend call is worth repeating
//! - Sleep with exponential backoff + jitter between attempts
//! - Give up after a bounded number of attempts
//!
//! # Design Decisions
//! - Only `BackendError::is_retryable` errors are repeated
//! - The caller decides what a final failure means (drop a batch, fail a cycle)

use std::future::Future;
use std::time::Duration;

use crate::backend::BackendError;
use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Explicit retry policy shared by every backend call of a cycle.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.multiplier,
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Delay before the attempt following `attempt` failed attempts.
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.multiplier,
            self.jitter_ratio,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `call` until it succeeds, fails permanently, or the policy runs out of attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                let delay = policy.backoff(attempts);
                tracing::debug!(operation, attempt = attempts, delay = ?delay, error = %e, "Retrying backend call");
                metrics::record_backend_retry(operation);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(operation, attempts, error = %e, "Backend call failed after all attempts");
                }
                return Err(e);
            }
        }
    }
}
