//! Core data types used throughout the rpl library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **File System State**: [`FileEntry`], [`Manifest`] - one point-in-time
//!   view of the tracked tree
//! - **Snapshots**: [`Snapshot`], [`SnapshotSummary`] - versioned captures
//! - **Change Tracking**: [`ChangeKind`], [`ChangeRecord`] - the watcher's
//!   append-only delta log
//! - **Storage**: [`ContentRef`] - references into the content store
//! - **Operations**: [`RestoreReport`] - the outcome of a restore
//! - **Configuration**: [`ProjectConfig`], [`WatcherState`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single file recorded in a [`Manifest`]
///
/// Entries are immutable once recorded. The content hash is the SHA-256 of
/// the file's bytes; files that could not be read are kept with an empty
/// hash and `unreadable` set, rather than aborting the whole scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path from the project root (unique within a manifest)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: DateTime<Utc>,
    /// SHA-256 hash of file content (empty when unreadable)
    pub content_hash: String,
    /// Whether the file could not be read during the scan
    #[serde(default)]
    pub unreadable: bool,
}

/// Ordered point-in-time view of the project tree
///
/// Entries are sorted lexicographically by relative path, so two scans of an
/// unchanged tree produce identical manifests. A manifest is never mutated
/// after creation, only superseded by the next scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// When the tree was scanned
    pub captured_at: DateTime<Utc>,
    /// All files, sorted by path
    pub entries: Vec<FileEntry>,
    /// Sum of entry sizes
    pub total_size: u64,
    /// Number of entries
    pub file_count: usize,
}

impl Manifest {
    /// Build a manifest from scan entries, sorting and computing totals
    pub fn new(mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let total_size = entries.iter().map(|e| e.size).sum();
        let file_count = entries.len();
        Manifest {
            captured_at: Utc::now(),
            entries,
            total_size,
            file_count,
        }
    }

    /// Look up an entry by its relative path
    pub fn get(&self, path: &std::path::Path) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_path().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// A versioned capture of the project tree
///
/// Serialized with bincode to `snapshots/snapshot_<version>.rpl`, with a
/// pretty-JSON mirror written alongside for human inspection. Every entry in
/// the manifest has its bytes stored content-addressed in `backups/` before
/// the snapshot's version is registered in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Semantic version label, unique across the project's lifetime
    pub version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// The captured tree
    pub manifest: Manifest,
}

/// Lightweight view of a snapshot, as produced by `list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Version label
    pub version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Number of files captured
    pub file_count: usize,
    /// Total uncompressed size in bytes
    pub total_size: u64,
}

/// Kind of change detected by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Path present in the new manifest but not the old one
    Created,
    /// Path present in both with a different content hash
    Modified,
    /// Path present in the old manifest but not the new one
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// Reference to stored content
///
/// The store has two backing strategies behind one interface: snapshot
/// bodies are content-addressed by hash (deduplicated across versions),
/// auto-save bodies are keyed by path + timestamp (every watcher event is
/// inherently unique, so there is nothing to deduplicate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ContentRef {
    /// SHA-256 hex hash of a content-addressed object in `backups/`
    Object(String),
    /// File name of a timestamp-keyed body in `auto_save/`
    AutoSave(String),
}

impl ContentRef {
    /// The raw key string of this reference
    pub fn key(&self) -> &str {
        match self {
            ContentRef::Object(hash) => hash,
            ContentRef::AutoSave(name) => name,
        }
    }
}

/// One detected delta, as recorded in the append-only change log
///
/// Created and modified records carry a reference to the auto-saved body so
/// every historical version of a path is individually retrievable; deleted
/// records carry no content reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// When the delta was observed
    pub timestamp: DateTime<Utc>,
    /// What happened to the path
    pub kind: ChangeKind,
    /// Relative path of the affected file
    pub path: PathBuf,
    /// Auto-save reference to the file's bytes (absent for deletes)
    pub content_ref: Option<ContentRef>,
    /// Size of the file at the time of the change (0 for deletes)
    pub size: u64,
}

/// Outcome of a restore operation
///
/// Restore is the one destructive operation in the system and does not roll
/// back on partial failure; this report enumerates exactly which paths were
/// restored, which failed (with the reason), and which live files were
/// deleted, so a partial restore is never silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Version that was restored
    pub version: String,
    /// Paths successfully written back
    pub restored: Vec<PathBuf>,
    /// Paths that could not be restored, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Live paths deleted because the target manifest does not contain them
    pub deleted: Vec<PathBuf>,
    /// Total bytes written
    pub bytes_written: u64,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl RestoreReport {
    /// Whether every manifest entry was restored
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Project metadata written by `init` to `.rpl/config.json`
///
/// Consumed read-only by every other operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// When the project was initialized
    pub created_at: DateTime<Utc>,
    /// Absolute path of the tracked project root
    pub project_root: PathBuf,
    /// Layout format version for forward compatibility
    pub format_version: u32,
}

/// State of a running watcher, persisted to `.rpl/watcher/state.json`
///
/// Persisting this lets a `stop` invoked from a different process locate the
/// running watcher and signal it through the stop marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherState {
    /// Process id of the watcher
    pub pid: u32,
    /// When the watcher started
    pub started_at: DateTime<Utc>,
    /// Polling interval in milliseconds
    pub interval_ms: u64,
}
