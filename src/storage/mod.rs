//! Persisted state.
//!
//! # Data Flow
//! ```text
//! driver (end of cycle / shutdown)
//!     → store.rs (pick file, wrap in versioned envelope)
//!     → atomic.rs (write <file>.tmp, fsync, rename over <file>)
//!
//! driver (startup)
//!     → store.rs (read, check version and kind, decode)
//!     → None on anything unexpected, with a warning
//! ```
//!
//! # Layout
//! - `<data_dir>/ledger.json`: remembered trace ids with observed-at times
//! - `<data_dir>/counters.json`: every counter family, verbatim
//! - `<data_dir>/window.json`: end of the last completed window
//!
//! # Design Decisions
//! - Each file is replaced independently; a crash mid-write leaves the
//!   previous snapshot intact
//! - Unknown versions fail closed (treated as absent), never crash startup

pub mod atomic;
pub mod store;

pub use atomic::write_atomic;
pub use store::{StateFile, StateStore, StorageError, SCHEMA_VERSION};
