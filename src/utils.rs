//! Utility functions for hashing, atomic writes, and path handling

use crate::error::{Result, RplError};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Makes concurrent temp names unique even for files sharing a stem
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Compute the SHA-256 hash of a file, streaming in 64 KiB chunks
pub fn hash_file_content(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 hash of a byte slice
pub fn hash_data(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Write data to a file atomically via a temporary sibling and rename
///
/// A reader never observes a half-written file at `path`: it sees either the
/// previous content or the full new content.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RplError::internal(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension(format!(
        "tmp.{}.{}",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Make a path relative to a base directory
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            RplError::internal(format!(
                "path {} is not under {}",
                path.display(),
                base.display()
            ))
        })
}

/// Sanitize a relative path into a flat file name for the auto-save area
///
/// Separators become underscores so `src/main.rs` maps to `src_main.rs`.
pub fn sanitize_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace(['/', '\\'], "_")
}

/// Format a byte count as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
