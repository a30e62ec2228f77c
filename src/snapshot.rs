//! Snapshot serialization and loading
//!
//! Snapshots are written as bincode to `snapshots/snapshot_<version>.rpl`,
//! with a pretty-JSON mirror alongside for inspection with ordinary tools.
//! The bincode file is authoritative; the mirror is never read back.

use crate::error::{Result, RplError};
use crate::types::Snapshot;
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes snapshot files under the metadata directory
#[derive(Debug)]
pub struct SnapshotManager {
    snapshots_dir: PathBuf,
}

impl SnapshotManager {
    /// Open (or create) the snapshot area under the metadata directory
    pub fn new(meta_dir: &Path) -> Result<Self> {
        let snapshots_dir = meta_dir.join("snapshots");
        fs::create_dir_all(&snapshots_dir)?;
        Ok(SnapshotManager { snapshots_dir })
    }

    /// Persist a snapshot, returning the file name it was written to
    pub fn save(&self, snapshot: &Snapshot) -> Result<String> {
        let file_name = Self::file_name(&snapshot.version);

        let data = bincode::serde::encode_to_vec(snapshot, bincode::config::standard())?;
        utils::atomic_write(&self.snapshots_dir.join(&file_name), &data)?;

        let mirror = serde_json::to_vec_pretty(snapshot)?;
        utils::atomic_write(
            &self.snapshots_dir.join(format!("snapshot_{}.json", snapshot.version)),
            &mirror,
        )?;

        debug!(
            "wrote snapshot {} ({} files, {} bytes serialized)",
            snapshot.version,
            snapshot.manifest.file_count,
            data.len()
        );
        Ok(file_name)
    }

    /// Load a snapshot by version
    pub fn load(&self, version: &str) -> Result<Snapshot> {
        let path = self.snapshots_dir.join(Self::file_name(version));
        if !path.exists() {
            return Err(RplError::VersionNotFound(version.to_string()));
        }

        let data = fs::read(&path)?;
        let (snapshot, _): (Snapshot, usize) =
            bincode::serde::decode_from_slice(&data, bincode::config::standard())?;

        if snapshot.version != version {
            return Err(RplError::corrupt(format!(
                "snapshot file for {} contains version {}",
                version, snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Validate a version label for use in snapshot file names
    ///
    /// Labels must be non-empty and must not contain path separators or
    /// traversal components.
    pub fn validate_version(version: &str) -> Result<()> {
        if version.is_empty() {
            return Err(RplError::InvalidVersion("empty version".to_string()));
        }
        if version.contains('/') || version.contains('\\') || version.contains("..") {
            return Err(RplError::InvalidVersion(format!(
                "version '{}' contains path characters",
                version
            )));
        }
        Ok(())
    }

    fn file_name(version: &str) -> String {
        format!("snapshot_{}.rpl", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileEntry, Manifest};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_snapshot(version: &str) -> Snapshot {
        let manifest = Manifest::new(vec![FileEntry {
            path: PathBuf::from("a.txt"),
            size: 3,
            modified: Utc::now(),
            content_hash: "abc".to_string(),
            unreadable: false,
        }]);
        Snapshot {
            version: version.to_string(),
            created_at: Utc::now(),
            manifest,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        let snapshot = sample_snapshot("1.0.0");

        let file_name = manager.save(&snapshot).unwrap();
        assert_eq!(file_name, "snapshot_1.0.0.rpl");

        let loaded = manager.load("1.0.0").unwrap();
        assert_eq!(loaded.version, "1.0.0");
        assert_eq!(loaded.manifest.file_count, 1);
        assert_eq!(loaded.manifest.entries[0].path, PathBuf::from("a.txt"));
    }

    #[test]
    fn test_json_mirror_written() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        manager.save(&sample_snapshot("0.1.0")).unwrap();

        let mirror = dir.path().join("snapshots/snapshot_0.1.0.json");
        let parsed: serde_json::Value =
            serde_json::from_slice(&fs::read(mirror).unwrap()).unwrap();
        assert_eq!(parsed["version"], "0.1.0");
    }

    #[test]
    fn test_load_missing_version() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();

        match manager.load("9.9.9") {
            Err(RplError::VersionNotFound(v)) => assert_eq!(v, "9.9.9"),
            other => panic!("expected VersionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_version() {
        assert!(SnapshotManager::validate_version("1.0.0").is_ok());
        assert!(SnapshotManager::validate_version("release-candidate").is_ok());
        assert!(SnapshotManager::validate_version("").is_err());
        assert!(SnapshotManager::validate_version("a/b").is_err());
        assert!(SnapshotManager::validate_version("..").is_err());
    }
}
