//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms about the exporter itself)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by EnvFilter)
//!     → `/metrics`, appended after the trace-derived families
//! ```
//!
//! # Design Decisions
//! - Structured key-value logging, no string interpolation of fields
//! - Self-metrics use the `metrics` facade; recording is a no-op until a
//!   recorder is installed, so library code and tests never need setup
//! - The Prometheus recorder has no listener of its own; the HTTP server
//!   renders it

pub mod logging;
pub mod metrics;
