//! Last-cycle health state.
//!
//! # States
//! - Starting: no cycle has finished since the process started
//! - Ok: the last cycle completed within its soft deadline
//! - Overran: the last cycle completed, but after its deadline
//! - Failed: the last cycle aborted (listing failed), nothing was published
//!
//! # State Transitions
//! ```text
//! Starting → Ok | Overran | Failed
//! any      → Ok | Overran | Failed   (each cycle replaces the previous state)
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Starting,
    Ok,
    Overran,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleHealth {
    pub status: CycleStatus,
    /// Number of the last completed cycle, if any.
    pub last_cycle: Option<u64>,
    pub last_duration: Option<Duration>,
    /// Consecutive failed cycles.
    pub consecutive_failures: u32,
}

impl CycleHealth {
    fn starting() -> Self {
        Self {
            status: CycleStatus::Starting,
            last_cycle: None,
            last_duration: None,
            consecutive_failures: 0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, CycleStatus::Starting | CycleStatus::Ok)
    }

    /// Plain-text body for `/health`.
    pub fn describe(&self) -> String {
        match &self.status {
            CycleStatus::Starting => "STARTING".to_string(),
            CycleStatus::Ok => "OK".to_string(),
            CycleStatus::Overran => "UNHEALTHY: last cycle exceeded deadline".to_string(),
            CycleStatus::Failed { reason } => format!("UNHEALTHY: last cycle failed: {}", reason),
        }
    }
}

/// Shared, lock-free view of the last cycle's outcome.
#[derive(Debug)]
pub struct HealthState {
    inner: ArcSwap<CycleHealth>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(CycleHealth::starting()),
        }
    }

    pub fn current(&self) -> Arc<CycleHealth> {
        self.inner.load_full()
    }

    pub fn record_completed(&self, cycle: u64, elapsed: Duration, deadline: Duration) {
        let status = if elapsed <= deadline {
            CycleStatus::Ok
        } else {
            tracing::warn!(cycle, elapsed = ?elapsed, deadline = ?deadline, "Cycle overran its deadline");
            CycleStatus::Overran
        };
        self.inner.store(Arc::new(CycleHealth {
            status,
            last_cycle: Some(cycle),
            last_duration: Some(elapsed),
            consecutive_failures: 0,
        }));
    }

    pub fn record_failed(&self, reason: impl Into<String>) {
        let previous = self.inner.load();
        let next = CycleHealth {
            status: CycleStatus::Failed { reason: reason.into() },
            last_cycle: previous.last_cycle,
            last_duration: previous.last_duration,
            consecutive_failures: previous.consecutive_failures.saturating_add(1),
        };
        self.inner.store(Arc::new(next));
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
