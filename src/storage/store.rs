//! Versioned JSON snapshots in the data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;
use crate::storage::atomic::write_atomic;

/// Version written into every envelope; other versions are ignored on load.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode {kind} snapshot: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The independently replaced state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFile {
    Ledger,
    Counters,
    Window,
}

impl StateFile {
    pub fn kind(self) -> &'static str {
        match self {
            StateFile::Ledger => "ledger",
            StateFile::Counters => "counters",
            StateFile::Window => "window",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StateFile::Ledger => "ledger.json",
            StateFile::Counters => "counters.json",
            StateFile::Window => "window.json",
        }
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    kind: &'static str,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    kind: String,
    data: serde_json::Value,
}

/// Reads and writes state snapshots under one data directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: StateFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    /// Serialize `data` into its envelope and atomically replace the file.
    ///
    /// Failures are counted in self-metrics; the caller decides how loudly to log.
    pub fn save<T: Serialize>(&self, file: StateFile, data: &T) -> Result<(), StorageError> {
        let result = self.write(file, data);
        if result.is_err() {
            metrics::record_persist_failure(file.kind());
        }
        result
    }

    fn write<T: Serialize>(&self, file: StateFile, data: &T) -> Result<(), StorageError> {
        let envelope = EnvelopeOut {
            version: SCHEMA_VERSION,
            kind: file.kind(),
            data,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|source| StorageError::Encode {
            kind: file.kind(),
            source,
        })?;
        let path = self.path(file);
        write_atomic(&path, &bytes).map_err(|source| StorageError::Io { path, source })
    }

    /// Load a snapshot, or `None` when it is missing or unusable.
    pub fn load<T: DeserializeOwned>(&self, file: StateFile) -> Option<T> {
        let path = self.path(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No persisted state");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable state file, starting empty");
                return None;
            }
        };

        let envelope: EnvelopeIn = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt state file, starting empty");
                return None;
            }
        };

        if envelope.version != SCHEMA_VERSION || envelope.kind != file.kind() {
            tracing::warn!(
                path = %path.display(),
                version = envelope.version,
                kind = %envelope.kind,
                expected_version = SCHEMA_VERSION,
                expected_kind = file.kind(),
                "Incompatible state file, starting empty"
            );
            return None;
        }

        match serde_json::from_value(envelope.data) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Undecodable state file, starting empty");
                None
            }
        }
    }
}
