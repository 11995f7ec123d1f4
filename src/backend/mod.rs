//! Tracing backend subsystem.
//!
//! # Data Flow
//! ```text
//! Fetcher
//!     → TraceBackend::list_trace_ids(window)      (paginated listing)
//!     → TraceBackend::get_trace_detail(batch)     (batch detail)
//!         client.rs: X-Ray-compatible JSON API over HTTP
//!         document.rs: raw segment documents → typed TraceSummary
//! ```
//!
//! # Design Decisions
//! - The pipeline only sees the `TraceBackend` trait; tests script it in memory
//! - Payloads are decoded into explicit typed records at this boundary
//! - Errors carry whether they are worth retrying

pub mod client;
pub mod document;
pub mod types;

use async_trait::async_trait;

pub use client::HttpTraceBackend;
pub use types::{BackendError, BackendResult, HttpInfo, NodeKind, SegmentRef, TimeWindow, TraceSummary};

/// Abstract client for the distributed-tracing backend.
#[async_trait]
pub trait TraceBackend: Send + Sync {
    /// List every trace id whose trace falls in `[window.start, window.end)`.
    async fn list_trace_ids(&self, window: TimeWindow) -> BackendResult<Vec<String>>;

    /// Fetch full detail for one batch of trace ids.
    ///
    /// Ids the backend could not resolve are simply absent from the result.
    async fn get_trace_detail(&self, ids: &[String]) -> BackendResult<Vec<TraceSummary>>;
}
