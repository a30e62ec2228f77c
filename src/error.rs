//! Error types for the rpl library
//!
//! All fallible operations return [`Result`], with [`RplError`] covering the
//! four externally meaningful failure classes: version conflicts, missing
//! versions/objects, I/O failures, and detected corruption. Errors carry
//! enough context to identify the offending version or path.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the rpl library
pub type Result<T> = std::result::Result<T, RplError>;

/// Main error type for all rpl operations
#[derive(Debug, Error)]
pub enum RplError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// A snapshot with this version is already registered
    #[error("Version conflict: snapshot {0} already exists")]
    VersionConflict(String),

    /// No snapshot registered under this version
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Object not found in the content store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// A snapshot references content that cannot be retrieved, or stored
    /// data fails to deserialize
    #[error("Corruption detected: {0}")]
    Corrupt(String),

    /// Invalid version label supplied by the caller
    #[error("Invalid version label: {0}")]
    InvalidVersion(String),

    /// Project has no .rpl metadata directory yet
    #[error("Project not initialized at {0:?} (run `rpl init` first)")]
    NotInitialized(PathBuf),

    /// A watcher is already running for this project
    #[error("Watcher already running (pid {0})")]
    WatcherAlreadyRunning(u32),

    /// No watcher is running for this project
    #[error("No watcher is running for this project")]
    WatcherNotRunning,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

// Bincode 2.0 splits its error type between encode and decode.
impl From<bincode::error::DecodeError> for RplError {
    fn from(err: bincode::error::DecodeError) -> Self {
        RplError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for RplError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RplError::Bincode(err.to_string())
    }
}

impl RplError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        RplError::Internal(msg.into())
    }

    /// Create a corruption error with a custom message
    pub fn corrupt(msg: impl Into<String>) -> Self {
        RplError::Corrupt(msg.into())
    }

    /// Check if this error indicates corrupted storage state
    pub fn is_corruption(&self) -> bool {
        matches!(self, RplError::Corrupt(_) | RplError::Bincode(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            RplError::VersionConflict(v) => {
                format!("Snapshot '{}' already exists. Pick a new version label.", v)
            }
            RplError::VersionNotFound(v) => {
                format!("Snapshot '{}' not found. Use 'rpl list' to see available versions.", v)
            }
            RplError::NotInitialized(path) => {
                format!("No .rpl directory under {:?}. Run 'rpl init' first.", path)
            }
            RplError::WatcherAlreadyRunning(pid) => {
                format!("A watcher is already running (pid {}). Use 'rpl stop' to stop it.", pid)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RplError::VersionNotFound("1.0.0".to_string());
        assert_eq!(err.to_string(), "Version not found: 1.0.0");

        let err = RplError::VersionConflict("2.0.0".to_string());
        assert_eq!(err.to_string(), "Version conflict: snapshot 2.0.0 already exists");
    }

    #[test]
    fn test_error_corruption() {
        assert!(RplError::Corrupt("bad manifest".to_string()).is_corruption());
        assert!(!RplError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")).is_corruption());
        assert!(!RplError::VersionNotFound("1.0.0".to_string()).is_corruption());
    }

    #[test]
    fn test_user_message_suggests_list() {
        let msg = RplError::VersionNotFound("0.3.1".to_string()).user_message();
        assert!(msg.contains("rpl list"));
    }
}
