//! Trace ingestion and metric aggregation pipeline.
//!
//! # Data Flow
//! ```text
//! driver.rs (one cycle per interval)
//!     → window.rs (next [start, now) from the persisted window end)
//!     → fetcher.rs (list ids, skip ledger hits, batch detail via worker pool)
//!     → processor.rs (trace → request observation + dependency edges)
//!     → aggregator.rs (fold counters, recompute touched gauges, mark ledger.rs)
//!     → storage (ledger, counters, window end)
//!     → ArcSwap publish of the new MetricsSnapshot
//! ```
//!
//! # Design Decisions
//! - The driver is the single writer; fetch workers only return data
//! - Nothing is mutated until fetching finished, so an aborted cycle leaves
//!   no trace in the state
//! - Trace ids are marked when aggregated, never when fetched

pub mod aggregator;
pub mod driver;
pub mod fetcher;
pub mod ledger;
pub mod processor;
pub mod window;

pub use aggregator::{Aggregator, CounterState, MetricsSnapshot};
pub use driver::{Collector, CycleError, CycleSummary, SnapshotHandle};
pub use fetcher::{FetchError, FetchOutcome, TraceFetcher};
pub use ledger::{LedgerEntry, TraceLedger};
pub use processor::{process, DependencyEdge, MalformedTraceError, Observation, TraceObservations};
pub use window::{next_window, WindowState};
