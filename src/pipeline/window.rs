//! Polling window computation and resume.

use serde::{Deserialize, Serialize};

use crate::backend::TimeWindow;
use crate::config::CollectorConfig;
use crate::storage::{StateFile, StateStore, StorageError};

/// End of the last completed window, persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub last_end: u64,
}

impl WindowState {
    pub fn load_from(store: &StateStore) -> Option<Self> {
        let state = store.load::<Self>(StateFile::Window)?;
        tracing::info!(last_end = state.last_end, "Resuming from persisted window end");
        Some(state)
    }

    pub fn persist_to(&self, store: &StateStore) -> Result<(), StorageError> {
        store.save(StateFile::Window, self)
    }
}

/// Window `[start, now)` for the next cycle.
///
/// - no previous end (or one in the future): the last interval
/// - otherwise from the previous end, pulled back by the overlap once the gap
///   allows it
/// - never reaching back further than `max_lookback_windows` intervals
pub fn next_window(now: u64, last_end: Option<u64>, config: &CollectorConfig) -> TimeWindow {
    let interval = config.interval_secs;
    let lookback = interval.saturating_mul(u64::from(config.max_lookback_windows.max(1)));

    let start = match last_end {
        Some(end) if end <= now => {
            if now - end >= config.overlap_secs {
                end.saturating_sub(config.overlap_secs)
            } else {
                end
            }
        }
        Some(end) => {
            tracing::warn!(last_end = end, now, "Persisted window end is in the future, ignoring it");
            now.saturating_sub(interval)
        }
        None => now.saturating_sub(interval),
    };

    TimeWindow::new(start.max(now.saturating_sub(lookback)), now)
}
