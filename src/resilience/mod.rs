//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the tracing backend:
//!     → timeouts.rs (enforce per-request deadline)
//!     → On failure: retries.rs (check if retryable, retry with backoff)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Every backend call has a deadline
//! - Anything not explicitly permanent is retried
//! - One retry policy, applied uniformly by the fetcher

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{retry_with_backoff, RetryPolicy};
pub use timeouts::with_timeout;
