//! Version index: the registry of snapshots that exist
//!
//! The index is the commit point for snapshot creation. A snapshot whose
//! content and manifest are fully on disk but whose version is not in the
//! index does not exist as far as every read path is concerned, which is
//! what makes interrupted creates invisible rather than corrupt. The index
//! is persisted as JSON at `.rpl/index.json` and rewritten atomically on
//! every registration.

use crate::error::{Result, RplError};
use crate::types::SnapshotSummary;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One registered snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Version label
    pub version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Number of files in the snapshot
    pub file_count: usize,
    /// Total size of the snapshot's files in bytes
    pub total_size: u64,
    /// Snapshot file name under `snapshots/`
    pub snapshot_file: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: Vec<IndexEntry>,
}

/// Registry of snapshot versions, in registration order
#[derive(Debug)]
pub struct VersionIndex {
    path: PathBuf,
    entries: Vec<IndexEntry>,
}

impl VersionIndex {
    /// Load the index from the metadata directory, empty if absent
    pub fn load(meta_dir: &Path) -> Result<Self> {
        let path = meta_dir.join("index.json");
        let entries = if path.exists() {
            let data = fs::read(&path)?;
            let file: IndexFile = serde_json::from_slice(&data)
                .map_err(|e| RplError::corrupt(format!("index.json: {}", e)))?;
            file.entries
        } else {
            Vec::new()
        };

        Ok(VersionIndex { path, entries })
    }

    /// Register a new version, persisting the index before returning
    ///
    /// Fails with [`RplError::VersionConflict`] if the version already
    /// exists; versions are never reused, even after other versions are
    /// added in between.
    pub fn register(&mut self, entry: IndexEntry) -> Result<()> {
        if self.contains(&entry.version) {
            return Err(RplError::VersionConflict(entry.version));
        }

        let version = entry.version.clone();
        self.entries.push(entry);
        self.persist()?;
        debug!("registered version {}", version);
        Ok(())
    }

    /// Whether a version is registered
    pub fn contains(&self, version: &str) -> bool {
        self.entries.iter().any(|e| e.version == version)
    }

    /// Look up a registered version
    pub fn get(&self, version: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    /// All registered versions, in registration order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Summaries of all registered versions, in registration order
    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.entries
            .iter()
            .map(|e| SnapshotSummary {
                version: e.version.clone(),
                created_at: e.created_at,
                file_count: e.file_count,
                total_size: e.total_size,
            })
            .collect()
    }

    fn persist(&self) -> Result<()> {
        let file = IndexFile {
            entries: self.entries.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        utils::atomic_write(&self.path, &data)
    }
}
