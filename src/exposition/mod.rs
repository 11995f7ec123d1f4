//! Exposition adapter.
//!
//! # Data Flow
//! ```text
//! GET /metrics
//!     → load latest MetricsSnapshot (never a half-applied cycle)
//!     → render.rs (fresh prometheus Registry, help text from catalog.rs)
//!     → TextEncoder body, families sorted by name
//! ```
//!
//! # Design Decisions
//! - Rendering is a pure function of the snapshot; it never triggers a cycle
//! - Families without samples are omitted entirely
//! - Observations never carry empty label values; the processor drops them

pub mod catalog;
pub mod render;

pub use catalog::{MetricFamily, MetricKind, CATALOG};
pub use render::{render, ExpositionError, CONTENT_TYPE};
