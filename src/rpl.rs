//! Main orchestrator tying the scanner, store, snapshots and index together
//!
//! [`Rpl`] owns a project's metadata directory and exposes the lifecycle
//! operations: `init`, `create`, `list`, `restore`. A single write lock
//! serializes the mutating operations (snapshot creation, restore, and the
//! watcher's per-cycle writes); reads go through without it.

use crate::error::{Result, RplError};
use crate::index::{IndexEntry, VersionIndex};
use crate::scanner::TreeScanner;
use crate::snapshot::SnapshotManager;
use crate::store::ContentStore;
use crate::types::{
    FileEntry, ProjectConfig, RestoreReport, Snapshot, SnapshotSummary,
};
use crate::utils;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Current on-disk layout version
const FORMAT_VERSION: u32 = 1;

/// Builder for configuring an [`Rpl`] instance
///
/// ```no_run
/// use rpl::RplBuilder;
///
/// let rpl = RplBuilder::new()
///     .ignore_patterns(vec!["target/**".to_string()])
///     .open("/path/to/project")
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct RplBuilder {
    ignore_patterns: Vec<String>,
}

impl RplBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra gitignore-style patterns excluded from scans
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Initialize a new project at the given root (idempotent)
    pub fn init(self, root: impl Into<PathBuf>) -> Result<Rpl> {
        Rpl::init_with(root.into(), self.ignore_patterns)
    }

    /// Open an already initialized project
    pub fn open(self, root: impl Into<PathBuf>) -> Result<Rpl> {
        Rpl::open_with(root.into(), self.ignore_patterns)
    }
}

/// A project's snapshot and backup engine
#[derive(Debug)]
pub struct Rpl {
    root: PathBuf,
    meta_dir: PathBuf,
    config: ProjectConfig,
    store: ContentStore,
    snapshots: SnapshotManager,
    index: Mutex<VersionIndex>,
    write_lock: Mutex<()>,
    ignore_patterns: Vec<String>,
}

impl Rpl {
    /// Initialize a project at the given root, creating `.rpl/`
    ///
    /// Idempotent: initializing an already initialized project reopens it.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        Self::init_with(root.into(), Vec::new())
    }

    /// Open an already initialized project
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(root.into(), Vec::new())
    }

    /// Whether a project at this root has been initialized
    pub fn is_initialized(root: &Path) -> bool {
        root.join(crate::scanner::META_DIR).join("config.json").exists()
    }

    fn init_with(root: PathBuf, ignore_patterns: Vec<String>) -> Result<Self> {
        let root = root.canonicalize()?;
        if Self::is_initialized(&root) {
            debug!("project at {} already initialized", root.display());
            return Self::open_with(root, ignore_patterns);
        }

        let meta_dir = root.join(crate::scanner::META_DIR);
        fs::create_dir_all(&meta_dir)?;
        fs::create_dir_all(meta_dir.join("snapshots"))?;
        fs::create_dir_all(meta_dir.join("changes"))?;
        fs::create_dir_all(meta_dir.join("watcher"))?;

        let config = ProjectConfig {
            created_at: Utc::now(),
            project_root: root.clone(),
            format_version: FORMAT_VERSION,
        };
        let data = serde_json::to_vec_pretty(&config)?;
        utils::atomic_write(&meta_dir.join("config.json"), &data)?;

        info!("initialized project at {}", root.display());
        Self::assemble(root, meta_dir, config, ignore_patterns)
    }

    fn open_with(root: PathBuf, ignore_patterns: Vec<String>) -> Result<Self> {
        let root = root.canonicalize()?;
        let meta_dir = root.join(crate::scanner::META_DIR);
        let config_path = meta_dir.join("config.json");
        if !config_path.exists() {
            return Err(RplError::NotInitialized(root));
        }

        let data = fs::read(&config_path)?;
        let config: ProjectConfig = serde_json::from_slice(&data)
            .map_err(|e| RplError::corrupt(format!("config.json: {}", e)))?;

        Self::assemble(root, meta_dir, config, ignore_patterns)
    }

    fn assemble(
        root: PathBuf,
        meta_dir: PathBuf,
        config: ProjectConfig,
        ignore_patterns: Vec<String>,
    ) -> Result<Self> {
        let store = ContentStore::new(&meta_dir)?;
        let snapshots = SnapshotManager::new(&meta_dir)?;
        let index = Mutex::new(VersionIndex::load(&meta_dir)?);

        Ok(Rpl {
            root,
            meta_dir,
            config,
            store,
            snapshots,
            index,
            write_lock: Mutex::new(()),
            ignore_patterns,
        })
    }

    /// The tracked project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The metadata directory (`<root>/.rpl`)
    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    /// Project configuration written at init time
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The content store
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Build a scanner for the project root
    pub fn scanner(&self) -> TreeScanner {
        TreeScanner::new(&self.root).with_ignore_patterns(self.ignore_patterns.clone())
    }

    /// The write lock serializing mutating operations
    pub(crate) fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }

    /// Capture the current tree under a new version label
    ///
    /// Content bodies and the snapshot file are written before the version
    /// is registered in the index, so an interrupted create leaves at most
    /// orphaned objects, never a registered version with missing content.
    pub fn create(&self, version: &str) -> Result<Snapshot> {
        SnapshotManager::validate_version(version)?;
        let _guard = self.write_lock.lock();

        if self.index.lock().contains(version) {
            return Err(RplError::VersionConflict(version.to_string()));
        }

        info!("creating snapshot {}", version);
        let mut manifest = self.scanner().scan()?;

        for entry in &mut manifest.entries {
            if entry.unreadable {
                continue;
            }
            self.store_entry(entry)?;
        }
        manifest.total_size = manifest.entries.iter().map(|e| e.size).sum();

        let snapshot = Snapshot {
            version: version.to_string(),
            created_at: Utc::now(),
            manifest,
        };
        let snapshot_file = self.snapshots.save(&snapshot)?;

        self.index.lock().register(IndexEntry {
            version: snapshot.version.clone(),
            created_at: snapshot.created_at,
            file_count: snapshot.manifest.file_count,
            total_size: snapshot.manifest.total_size,
            snapshot_file,
        })?;

        info!(
            "snapshot {} created ({} files, {})",
            version,
            snapshot.manifest.file_count,
            utils::format_bytes(snapshot.manifest.total_size)
        );
        Ok(snapshot)
    }

    /// Store one entry's bytes, reconciling the entry with what was stored
    ///
    /// The file may have changed or vanished between the scan and this read;
    /// in that case the entry is updated to describe the bytes actually
    /// stored, keeping every registered hash retrievable. A store write
    /// failure aborts the whole create: it means the metadata area itself is
    /// broken and the snapshot would reference content that was never saved.
    fn store_entry(&self, entry: &mut FileEntry) -> Result<()> {
        let absolute = self.root.join(&entry.path);
        match fs::read(&absolute) {
            Ok(data) => {
                let stored_hash = utils::hash_data(&data);
                if stored_hash != entry.content_hash {
                    debug!(
                        "{} changed between scan and store, recording stored content",
                        entry.path.display()
                    );
                    entry.content_hash = stored_hash;
                    entry.size = data.len() as u64;
                }
                self.store.put_object(&data).map_err(|e| match e {
                    RplError::Io(io) => RplError::Io(std::io::Error::new(
                        io.kind(),
                        format!("storing {}: {}", entry.path.display(), io),
                    )),
                    other => other,
                })?;
                Ok(())
            }
            Err(e) => {
                warn!("failed to read {}: {}", entry.path.display(), e);
                entry.content_hash = String::new();
                entry.unreadable = true;
                Ok(())
            }
        }
    }

    /// List registered snapshots in registration order
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        Ok(self.index.lock().summaries())
    }

    /// Load a registered snapshot by version
    pub fn load_snapshot(&self, version: &str) -> Result<Snapshot> {
        if !self.index.lock().contains(version) {
            return Err(RplError::VersionNotFound(version.to_string()));
        }
        self.snapshots.load(version)
    }

    /// Restore the tree to a registered version
    ///
    /// Live files absent from the target manifest are deleted, directory
    /// structure is recreated and modification times restored. Restore does
    /// not roll back on partial failure; the returned report enumerates the
    /// restored, failed and deleted paths.
    pub fn restore(&self, version: &str) -> Result<RestoreReport> {
        let _guard = self.write_lock.lock();
        let start = Instant::now();

        let snapshot = self.load_snapshot(version)?;
        info!(
            "restoring {} ({} files)",
            version, snapshot.manifest.file_count
        );

        let mut report = RestoreReport {
            version: version.to_string(),
            restored: Vec::new(),
            failed: Vec::new(),
            deleted: Vec::new(),
            bytes_written: 0,
            duration_ms: 0,
        };

        self.delete_extraneous(&snapshot, &mut report)?;

        for entry in &snapshot.manifest.entries {
            match self.restore_entry(entry) {
                Ok(bytes) => {
                    report.bytes_written += bytes;
                    report.restored.push(entry.path.clone());
                }
                Err(e) => {
                    warn!("failed to restore {}: {}", entry.path.display(), e);
                    report.failed.push((entry.path.clone(), e.to_string()));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "restore of {} finished: {} restored, {} failed, {} deleted in {}ms",
            version,
            report.restored.len(),
            report.failed.len(),
            report.deleted.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Delete live files not present in the target manifest
    fn delete_extraneous(&self, snapshot: &Snapshot, report: &mut RestoreReport) -> Result<()> {
        let target: HashSet<&Path> = snapshot
            .manifest
            .entries
            .iter()
            .map(|e| e.path.as_path())
            .collect();

        let current = self.scanner().scan()?;
        let mut parents = Vec::new();

        for entry in &current.entries {
            if target.contains(entry.path.as_path()) {
                continue;
            }
            let absolute = self.root.join(&entry.path);
            match fs::remove_file(&absolute) {
                Ok(()) => {
                    debug!("deleted {}", entry.path.display());
                    report.deleted.push(entry.path.clone());
                    if let Some(parent) = absolute.parent() {
                        parents.push(parent.to_path_buf());
                    }
                }
                Err(e) => {
                    warn!("failed to delete {}: {}", entry.path.display(), e);
                    report
                        .failed
                        .push((entry.path.clone(), format!("delete: {}", e)));
                }
            }
        }

        // Deepest first so nested empty directories collapse upward
        parents.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        parents.dedup();
        for dir in parents {
            self.remove_empty_dirs_up_to_root(&dir);
        }
        Ok(())
    }

    fn remove_empty_dirs_up_to_root(&self, start: &Path) {
        let mut dir = start.to_path_buf();
        while dir != self.root {
            let empty = fs::read_dir(&dir)
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            if !empty || fs::remove_dir(&dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
    }

    /// Restore a single manifest entry, returning the bytes written
    fn restore_entry(&self, entry: &FileEntry) -> Result<u64> {
        if entry.unreadable {
            return Err(RplError::internal(
                "captured as unreadable, no content stored".to_string(),
            ));
        }

        let data = self
            .store
            .get(&crate::types::ContentRef::Object(entry.content_hash.clone()))?;

        let absolute = self.root.join(&entry.path);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&absolute, &data)?;

        let mtime = filetime::FileTime::from_system_time(entry.modified.into());
        filetime::set_file_mtime(&absolute, mtime)?;

        Ok(data.len() as u64)
    }
}
