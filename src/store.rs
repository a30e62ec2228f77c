//! Content storage for snapshot bodies and auto-saved file versions
//!
//! One store, two backing strategies. Snapshot bodies are content-addressed:
//! the key is the SHA-256 of the bytes, stored flat under `backups/`, so
//! identical content across files and versions is stored once. Auto-save
//! bodies are keyed by sanitized path plus timestamp under `auto_save/`,
//! because every watcher event is a distinct historical version and there is
//! nothing to deduplicate. Both sides write through a temporary file and
//! rename, so a partially written object is never visible under its final
//! name.

use crate::error::{Result, RplError};
use crate::types::ContentRef;
use crate::utils;
use chrono::Utc;
use dashmap::DashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Content store rooted at the metadata directory
#[derive(Debug)]
pub struct ContentStore {
    backups_dir: PathBuf,
    auto_save_dir: PathBuf,
    /// Hashes known to exist on disk, to skip the stat on repeat puts
    known_objects: DashSet<String>,
    /// Disambiguates auto-save names landing in the same second
    sequence: AtomicU64,
}

impl ContentStore {
    /// Open (or create) a store under the given metadata directory
    pub fn new(meta_dir: &Path) -> Result<Self> {
        let backups_dir = meta_dir.join("backups");
        let auto_save_dir = meta_dir.join("auto_save");
        fs::create_dir_all(&backups_dir)?;
        fs::create_dir_all(&auto_save_dir)?;

        Ok(ContentStore {
            backups_dir,
            auto_save_dir,
            known_objects: DashSet::new(),
            sequence: AtomicU64::new(0),
        })
    }

    /// Store bytes content-addressed, returning their hash reference
    ///
    /// Idempotent: if an object with this hash already exists the write is
    /// skipped and the existing object is referenced.
    pub fn put_object(&self, data: &[u8]) -> Result<ContentRef> {
        let hash = utils::hash_data(data);

        if self.known_objects.contains(&hash) {
            trace!("object {} cached", &hash[..8]);
            return Ok(ContentRef::Object(hash));
        }

        let path = self.backups_dir.join(&hash);
        if !path.exists() {
            utils::atomic_write(&path, data)?;
            debug!("stored object {} ({} bytes)", &hash[..8], data.len());
        }
        self.known_objects.insert(hash.clone());

        Ok(ContentRef::Object(hash))
    }

    /// Store a file's bytes content-addressed
    pub fn put_object_from_file(&self, file: &Path) -> Result<ContentRef> {
        let data = fs::read(file)?;
        self.put_object(&data)
    }

    /// Store bytes as a timestamp-keyed auto-save body for a relative path
    ///
    /// The resulting name is `<sanitized-path>_<stamp>.bak`, with a sequence
    /// number folded into the stamp so two saves of the same path within one
    /// second never collide.
    pub fn put_auto_save(&self, relative: &Path, data: &[u8]) -> Result<ContentRef> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = format!("{}_{:04}", Utc::now().format("%Y%m%d%H%M%S"), seq);
        let name = format!("{}_{}.bak", utils::sanitize_path(relative), stamp);

        let path = self.auto_save_dir.join(&name);
        utils::atomic_write(&path, data)?;
        debug!("auto-saved {} as {}", relative.display(), name);

        Ok(ContentRef::AutoSave(name))
    }

    /// Retrieve the bytes behind a content reference
    pub fn get(&self, content_ref: &ContentRef) -> Result<Vec<u8>> {
        let path = self.path_for(content_ref);
        if !path.exists() {
            return Err(RplError::ObjectNotFound(content_ref.key().to_string()));
        }
        let data = fs::read(&path)?;

        if let ContentRef::Object(hash) = content_ref {
            let actual = utils::hash_data(&data);
            if &actual != hash {
                return Err(RplError::corrupt(format!(
                    "object {} hashes to {}",
                    hash, actual
                )));
            }
        }

        Ok(data)
    }

    /// Whether an object with this hash exists
    pub fn has_object(&self, hash: &str) -> bool {
        self.known_objects.contains(hash) || self.backups_dir.join(hash).exists()
    }

    /// Number of stored content-addressed objects
    pub fn object_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.backups_dir)? {
            if entry?.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn path_for(&self, content_ref: &ContentRef) -> PathBuf {
        match content_ref {
            ContentRef::Object(hash) => self.backups_dir.join(hash),
            ContentRef::AutoSave(name) => self.auto_save_dir.join(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ContentStore) {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_object() {
        let (_dir, store) = store();
        let content_ref = store.put_object(b"hello world").unwrap();

        assert!(matches!(content_ref, ContentRef::Object(_)));
        assert_eq!(store.get(&content_ref).unwrap(), b"hello world");
    }

    #[test]
    fn test_put_object_idempotent() {
        let (_dir, store) = store();
        let first = store.put_object(b"same bytes").unwrap();
        let second = store.put_object(b"same bytes").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.object_count().unwrap(), 1);
    }

    #[test]
    fn test_distinct_content_distinct_objects() {
        let (_dir, store) = store();
        store.put_object(b"one").unwrap();
        store.put_object(b"two").unwrap();

        assert_eq!(store.object_count().unwrap(), 2);
    }

    #[test]
    fn test_get_missing_object() {
        let (_dir, store) = store();
        let missing = ContentRef::Object("0".repeat(64));

        match store.get(&missing) {
            Err(RplError::ObjectNotFound(_)) => {}
            other => panic!("expected ObjectNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_get_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        let content_ref = store.put_object(b"original").unwrap();

        let obj_path = dir.path().join("backups").join(content_ref.key());
        fs::write(&obj_path, b"tampered").unwrap();

        assert!(store.get(&content_ref).unwrap_err().is_corruption());
    }

    #[test]
    fn test_auto_save_unique_names() {
        let (_dir, store) = store();
        let path = Path::new("src/main.rs");

        let a = store.put_auto_save(path, b"v1").unwrap();
        let b = store.put_auto_save(path, b"v2").unwrap();

        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap(), b"v1");
        assert_eq!(store.get(&b).unwrap(), b"v2");
        assert!(a.key().starts_with("src_main.rs_"));
        assert!(a.key().ends_with(".bak"));
    }

    #[test]
    fn test_has_object() {
        let (_dir, store) = store();
        let content_ref = store.put_object(b"present").unwrap();

        assert!(store.has_object(content_ref.key()));
        assert!(!store.has_object(&"f".repeat(64)));
    }
}
