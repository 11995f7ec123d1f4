//! Cycle health subsystem.
//!
//! # Data Flow
//! ```text
//! driver (after every cycle attempt)
//!     → state.rs (record completed / overran / failed)
//!     → ArcSwap publish
//!
//! GET /health
//!     → state.rs (load latest, map to status code + body)
//! ```
//!
//! # Design Decisions
//! - Health reflects the last cycle only, no hysteresis
//! - A cycle that completed but overran its soft deadline is unhealthy
//! - Scrapes of `/metrics` are unaffected by health

pub mod state;

pub use state::{CycleHealth, CycleStatus, HealthState};
