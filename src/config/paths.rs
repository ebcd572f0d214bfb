//! Path management for openclaw-backup
//!
//! Resolves where the tool keeps its own state: the configuration record,
//! per-backup metadata, scratch space and the single-instance lock.
//!
//! ## Path Resolution Order
//!
//! 1. `OPENCLAW_BACKUP_HOME` environment variable (if set)
//! 2. `$XDG_CONFIG_HOME/openclaw-backup` or `~/.config/openclaw-backup`

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::BackupError;

/// Environment variable overriding the state directory
pub const HOME_ENV: &str = "OPENCLAW_BACKUP_HOME";

/// Manages all paths used by openclaw-backup
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Base directory for all tool state
    base_dir: PathBuf,
}

impl BackupPaths {
    /// Create a new BackupPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var(HOME_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create BackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the configuration record
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("backup-config.json")
    }

    /// Get the directory holding one metadata record per backup
    pub fn metadata_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the scratch root for transient archives and extractions
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join("scratch")
    }

    /// Get the path of the single-instance lock file
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.metadata_dir()).map_err(|e| {
            BackupError::Io(format!("Failed to create metadata directory: {}", e))
        })?;

        std::fs::create_dir_all(self.scratch_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create scratch directory: {}", e)))?;

        Ok(())
    }

    /// Check if a configuration record has been written
    pub fn is_initialized(&self) -> bool {
        self.config_file().exists()
    }
}

/// Resolve the default state directory
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| home_dir().map(|home| home.join(".config")))?;
    Ok(config_base.join("openclaw-backup"))
}

/// The current user's home directory
pub fn home_dir() -> Result<PathBuf, BackupError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| BackupError::Config("Could not determine home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.metadata_dir(), temp_dir.path().join("backups"));
        assert_eq!(paths.scratch_dir(), temp_dir.path().join("scratch"));
        assert_eq!(
            paths.config_file(),
            temp_dir.path().join("backup-config.json")
        );
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().join("state"));

        assert!(!paths.is_initialized());
        paths.ensure_directories().unwrap();

        assert!(paths.metadata_dir().exists());
        assert!(paths.scratch_dir().exists());
    }
}
