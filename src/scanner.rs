//! Directory scanning and manifest diffing
//!
//! [`TreeScanner`] walks the project tree and produces a [`Manifest`]: a
//! sorted list of every regular file with its size, mtime and content hash.
//! [`diff_manifests`] compares two manifests and yields the created,
//! modified and deleted paths between them; it is the sole change-detection
//! primitive in the system, used both by snapshot creation and by the
//! polling watcher.

use crate::error::Result;
use crate::types::{ChangeKind, FileEntry, Manifest};
use crate::utils;
use chrono::{DateTime, Utc};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the metadata directory, always excluded from scans
pub const META_DIR: &str = ".rpl";

/// Walks a directory tree and builds manifests
pub struct TreeScanner {
    root: PathBuf,
    ignore_patterns: Vec<String>,
}

impl TreeScanner {
    /// Create a scanner rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TreeScanner {
            root: root.into(),
            ignore_patterns: Vec::new(),
        }
    }

    /// Add extra gitignore-style patterns to exclude from scans
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Scan the tree and produce a manifest
    ///
    /// Regular files only; directories and symlinks are skipped. Hidden
    /// files are included, the metadata directory is not. Files that cannot
    /// be read are recorded with an empty hash and the `unreadable` flag
    /// instead of failing the scan. Hashing runs in parallel across files.
    pub fn scan(&self) -> Result<Manifest> {
        // A missing or unreadable root is an error, not an empty tree
        std::fs::read_dir(&self.root)?;

        let mut override_builder = OverrideBuilder::new(&self.root);
        override_builder
            .add(&format!("!{}/**", META_DIR))
            .map_err(|e| crate::error::RplError::internal(format!("override pattern: {}", e)))?;
        for pattern in &self.ignore_patterns {
            override_builder
                .add(&format!("!{}", pattern))
                .map_err(|e| crate::error::RplError::internal(format!("override pattern: {}", e)))?;
        }
        let overrides = override_builder
            .build()
            .map_err(|e| crate::error::RplError::internal(format!("override build: {}", e)))?;

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .overrides(overrides)
            .build();

        let mut paths = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("walk error: {}", e);
                    continue;
                }
            };
            let is_file = entry
                .file_type()
                .map(|ft| ft.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(entry.into_path());
            }
        }

        let entries: Vec<FileEntry> = paths
            .par_iter()
            .filter_map(|path| match self.process_file(path) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        let manifest = Manifest::new(entries);
        debug!(
            "scanned {} files, {} bytes",
            manifest.file_count, manifest.total_size
        );
        Ok(manifest)
    }

    /// Build a manifest entry for a single file
    fn process_file(&self, path: &Path) -> Result<FileEntry> {
        let relative = utils::make_relative(path, &self.root)?;
        let metadata = std::fs::metadata(path)?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        match utils::hash_file_content(path) {
            Ok(content_hash) => Ok(FileEntry {
                path: relative,
                size: metadata.len(),
                modified,
                content_hash,
                unreadable: false,
            }),
            Err(e) => {
                warn!("unreadable file {}: {}", path.display(), e);
                Ok(FileEntry {
                    path: relative,
                    size: metadata.len(),
                    modified,
                    content_hash: String::new(),
                    unreadable: true,
                })
            }
        }
    }
}

/// One detected difference between two manifests
///
/// The entry is taken from the new manifest for creates and modifications,
/// and from the old manifest for deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDelta {
    /// What happened to the path
    pub kind: ChangeKind,
    /// The affected entry
    pub entry: FileEntry,
}

/// Whether two entries for the same path represent different content
///
/// Unreadable entries carry an empty hash, so when either side is
/// unreadable the comparison falls back to the flag plus size and mtime.
fn entry_changed(old: &FileEntry, new: &FileEntry) -> bool {
    if old.unreadable || new.unreadable {
        old.unreadable != new.unreadable || old.size != new.size || old.modified != new.modified
    } else {
        old.content_hash != new.content_hash
    }
}

/// Compare two manifests and list the created, modified and deleted entries
///
/// A path present only in `new` is created, present only in `old` is
/// deleted, present in both with a different content hash is modified.
/// Equal hashes produce nothing regardless of mtime, so a `touch` with no
/// content change is invisible.
pub fn diff_manifests(old: &Manifest, new: &Manifest) -> Vec<ManifestDelta> {
    let old_map: HashMap<&Path, &FileEntry> = old
        .entries
        .iter()
        .map(|e| (e.path.as_path(), e))
        .collect();
    let new_map: HashMap<&Path, &FileEntry> = new
        .entries
        .iter()
        .map(|e| (e.path.as_path(), e))
        .collect();

    let mut deltas = Vec::new();

    for entry in &new.entries {
        match old_map.get(entry.path.as_path()) {
            None => deltas.push(ManifestDelta {
                kind: ChangeKind::Created,
                entry: entry.clone(),
            }),
            Some(old_entry) if entry_changed(old_entry, entry) => deltas.push(ManifestDelta {
                kind: ChangeKind::Modified,
                entry: entry.clone(),
            }),
            Some(_) => {}
        }
    }

    for entry in &old.entries {
        if !new_map.contains_key(entry.path.as_path()) {
            deltas.push(ManifestDelta {
                kind: ChangeKind::Deleted,
                entry: entry.clone(),
            });
        }
    }

    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(path: &str, hash: &str) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            size: 1,
            modified: Utc::now(),
            content_hash: hash.to_string(),
            unreadable: false,
        }
    }

    #[test]
    fn test_scan_basic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"bee").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"ay").unwrap();

        let manifest = TreeScanner::new(dir.path()).scan().unwrap();

        assert_eq!(manifest.file_count, 2);
        let paths: Vec<_> = manifest.entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("b.txt"), PathBuf::from("sub/a.txt")]);
        assert!(manifest.entries.iter().all(|e| !e.content_hash.is_empty()));
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("never_created");

        match TreeScanner::new(&missing).scan() {
            Err(crate::error::RplError::Io(_)) => {}
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_root_replaced_by_file_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::write(&root, b"a file, not a directory").unwrap();

        assert!(matches!(
            TreeScanner::new(&root).scan(),
            Err(crate::error::RplError::Io(_))
        ));
    }

    #[test]
    fn test_scan_excludes_meta_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.txt"), b"x").unwrap();
        fs::create_dir_all(dir.path().join(".rpl/backups")).unwrap();
        fs::write(dir.path().join(".rpl/backups/obj"), b"stored").unwrap();

        let manifest = TreeScanner::new(dir.path()).scan().unwrap();

        assert_eq!(manifest.file_count, 1);
        assert_eq!(manifest.entries[0].path, PathBuf::from("file.txt"));
    }

    #[test]
    fn test_scan_extra_ignore_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/out.o"), b"o").unwrap();

        let manifest = TreeScanner::new(dir.path())
            .with_ignore_patterns(vec!["target/**".to_string()])
            .scan()
            .unwrap();

        assert_eq!(manifest.file_count, 1);
        assert_eq!(manifest.entries[0].path, PathBuf::from("keep.txt"));
    }

    #[test]
    fn test_scan_includes_hidden_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();

        let manifest = TreeScanner::new(dir.path()).scan().unwrap();
        assert_eq!(manifest.file_count, 1);
    }

    #[test]
    fn test_scan_deterministic() {
        let dir = TempDir::new().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }

        let scanner = TreeScanner::new(dir.path());
        let first = scanner.scan().unwrap();
        let second = scanner.scan().unwrap();

        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_diff_detects_all_kinds() {
        let old = Manifest::new(vec![
            entry("same.txt", "h1"),
            entry("changed.txt", "h2"),
            entry("gone.txt", "h3"),
        ]);
        let new = Manifest::new(vec![
            entry("same.txt", "h1"),
            entry("changed.txt", "h2b"),
            entry("fresh.txt", "h4"),
        ]);

        let deltas = diff_manifests(&old, &new);
        assert_eq!(deltas.len(), 3);

        let find = |p: &str| {
            deltas
                .iter()
                .find(|d| d.entry.path == PathBuf::from(p))
                .unwrap()
        };
        assert_eq!(find("fresh.txt").kind, ChangeKind::Created);
        assert_eq!(find("changed.txt").kind, ChangeKind::Modified);
        assert_eq!(find("gone.txt").kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_diff_unreadable_compares_by_metadata() {
        let stamp = Utc::now();
        let unreadable = |size: u64| FileEntry {
            path: PathBuf::from("locked.txt"),
            size,
            modified: stamp,
            content_hash: String::new(),
            unreadable: true,
        };

        let old = Manifest::new(vec![unreadable(10)]);
        let same = Manifest::new(vec![unreadable(10)]);
        let grown = Manifest::new(vec![unreadable(20)]);

        assert!(diff_manifests(&old, &same).is_empty());
        assert_eq!(diff_manifests(&old, &grown)[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let m = Manifest::new(vec![entry("a.txt", "h1"), entry("b.txt", "h2")]);
        assert!(diff_manifests(&m, &m).is_empty());
    }

    #[test]
    fn test_diff_empty_manifests() {
        let empty = Manifest::new(vec![]);
        let one = Manifest::new(vec![entry("a.txt", "h1")]);

        assert!(diff_manifests(&empty, &empty).is_empty());
        assert_eq!(diff_manifests(&empty, &one)[0].kind, ChangeKind::Created);
        assert_eq!(diff_manifests(&one, &empty)[0].kind, ChangeKind::Deleted);
    }
}
