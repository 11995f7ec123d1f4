//! Trace id ledger.
//!
//! Remembers which trace ids have already been aggregated so a later cycle
//! (or a restarted process) never counts them twice. Bounded by a maximum
//! entry count and an optional retention age; the oldest entries go first.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::storage::{StateFile, StateStore, StorageError};

/// One remembered trace id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    /// Unix seconds at which the trace was aggregated.
    pub observed_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    entries: Vec<LedgerEntry>,
}

/// Bounded set of already-aggregated trace ids.
#[derive(Debug)]
pub struct TraceLedger {
    max_entries: usize,
    retention: Option<Duration>,
    /// id → (observed_at, insertion sequence)
    entries: HashMap<String, (u64, u64)>,
    /// Eviction order: oldest observed_at first, insertion order within a second.
    order: BTreeMap<(u64, u64), String>,
    next_seq: u64,
}

impl TraceLedger {
    pub fn new(max_entries: usize, retention: Option<Duration>) -> Self {
        Self {
            max_entries: max_entries.max(1),
            retention,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.max_trace_ids, config.retention())
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remember `id`. Returns false when it was already present, in which case
    /// the original observed-at is kept.
    ///
    /// Never rejects: if the ledger is full, the oldest entries are dropped.
    pub fn mark(&mut self, id: &str, observed_at: u64) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id.to_string(), (observed_at, seq));
        self.order.insert((observed_at, seq), id.to_string());
        self.trim_to_capacity();
        true
    }

    /// Drop entries past the retention age, then enforce the size cap.
    ///
    /// Returns the number of entries removed.
    pub fn evict(&mut self, now: u64) -> usize {
        let before = self.entries.len();

        if let Some(retention) = self.retention {
            let cutoff = now.saturating_sub(retention.as_secs());
            let fresh = self.order.split_off(&(cutoff, 0));
            for id in std::mem::replace(&mut self.order, fresh).into_values() {
                self.entries.remove(&id);
            }
        }
        self.trim_to_capacity();

        before - self.entries.len()
    }

    fn trim_to_capacity(&mut self) {
        while self.entries.len() > self.max_entries {
            match self.order.pop_first() {
                Some((_, id)) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.order
            .iter()
            .map(|(&(observed_at, _), id)| LedgerEntry {
                id: id.clone(),
                observed_at,
            })
            .collect()
    }

    /// Restore from the data directory; a missing or corrupt snapshot yields
    /// an empty ledger.
    pub fn load_from(store: &StateStore, config: &LedgerConfig) -> Self {
        let mut ledger = Self::from_config(config);
        if let Some(snapshot) = store.load::<LedgerSnapshot>(StateFile::Ledger) {
            let mut entries = snapshot.entries;
            entries.sort_by_key(|e| e.observed_at);
            for entry in &entries {
                ledger.mark(&entry.id, entry.observed_at);
            }
            tracing::info!(entries = ledger.len(), "Loaded trace id ledger");
        }
        ledger
    }

    pub fn persist_to(&self, store: &StateStore) -> Result<(), StorageError> {
        let snapshot = LedgerSnapshot {
            entries: self.entries(),
        };
        store.save(StateFile::Ledger, &snapshot)?;
        tracing::debug!(entries = snapshot.entries.len(), "Persisted trace id ledger");
        Ok(())
    }
}
