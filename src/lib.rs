//! # rpl
//!
//! Structural snapshots and continuous backup for project trees.
//!
//! rpl captures the full state of a project directory under a semantic
//! version label, restores any captured version, and can run a background
//! watcher that records every file creation, modification and deletion as
//! it happens. All state lives under `.rpl/` inside the project itself;
//! there is no daemon and no network.
//!
//! ## Features
//!
//! - **Versioned snapshots**: capture the whole tree under a unique label,
//!   with content-addressed storage deduplicating identical bodies
//! - **Crash-safe creation**: a snapshot exists only once its version is
//!   registered in the index, which happens last
//! - **Full restore**: bring the tree back to any captured version,
//!   including deleting files that did not exist then
//! - **Continuous backup**: a polling watcher auto-saves every changed
//!   file and appends change records to a log
//!
//! ## Example
//!
//! ```no_run
//! use rpl::Rpl;
//!
//! # fn main() -> rpl::Result<()> {
//! let rpl = Rpl::init("./my-project")?;
//!
//! let snapshot = rpl.create("1.0.0")?;
//! println!("captured {} files", snapshot.manifest.file_count);
//!
//! for summary in rpl.list()? {
//!     println!("{} ({} files)", summary.version, summary.file_count);
//! }
//!
//! let report = rpl.restore("1.0.0")?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod rpl;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod utils;
pub mod watcher;

pub use error::{Result, RplError};
pub use index::{IndexEntry, VersionIndex};
pub use rpl::{Rpl, RplBuilder};
pub use scanner::{diff_manifests, ManifestDelta, TreeScanner};
pub use snapshot::SnapshotManager;
pub use store::ContentStore;
pub use types::{
    ChangeKind, ChangeRecord, ContentRef, FileEntry, Manifest, ProjectConfig, RestoreReport,
    Snapshot, SnapshotSummary, WatcherState,
};
pub use watcher::{ChangeWatcher, DEFAULT_INTERVAL};
