//! X-Ray trace exporter library.
//!
//! Polls an X-Ray-compatible tracing backend on a fixed cadence, folds the
//! traces into service, URL and dependency metrics, and serves them in the
//! Prometheus text format.

// Core pipeline
pub mod backend;
pub mod exposition;
pub mod pipeline;
pub mod storage;

// Serving
pub mod health;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use backend::{HttpTraceBackend, TraceBackend};
pub use config::schema::ExporterConfig;
pub use lifecycle::Shutdown;
pub use pipeline::{Collector, MetricsSnapshot};
