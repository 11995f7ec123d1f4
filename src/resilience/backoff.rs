//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is the number of attempts already made (1 after the first failure).
/// The delay grows by `multiplier` per attempt, is capped at `max_ms`, and gets
/// up to `jitter_ratio` of itself added on top.
pub fn calculate_backoff(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_ratio: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = (base_ms as f64) * multiplier.max(1.0).powi(exponent);
    let capped_delay = if delay_ms.is_finite() {
        (delay_ms as u64).min(max_ms)
    } else {
        max_ms
    };

    let jitter_range = (capped_delay as f64 * jitter_ratio.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
