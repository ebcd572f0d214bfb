//! Custom error types for openclaw-backup
//!
//! This module defines the error hierarchy for backup and restore operations
//! using thiserror for ergonomic error definitions.

use thiserror::Error;

/// The main error type for backup and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// No configuration file has been written yet
    #[error("No configuration found at {0}. Run: openclaw-backup config init")]
    ConfigMissing(String),

    /// Configuration is present but invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local filesystem errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Object store rejected an upload
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Object store failed to return an object
    #[error("Download failed: {0}")]
    Download(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Object store failed to delete an object
    #[error("Delete failed: {0}")]
    Delete(String),

    /// Key unavailable or encryption failure before upload
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Bad key or corrupt ciphertext after download
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Archive could not be extracted
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Restore has nothing to choose from
    #[error("No backups found under {0}")]
    NoBackups(String),

    /// Invalid input (names, selections, settings values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another invocation holds the single-instance lock
    #[error("Another backup or restore is running (lock: {0})")]
    Locked(String),
}

impl BackupError {
    /// Create a "not found" error for remote objects
    pub fn object_not_found(key: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Object",
            identifier: key.into(),
        }
    }

    /// Create a "not found" error for archives
    pub fn backup_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: name.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
