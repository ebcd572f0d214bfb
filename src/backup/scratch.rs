//! Scoped scratch directories
//!
//! Every backup and restore works inside a directory created under the
//! scratch root with a fixed name prefix. The directory is removed when its
//! guard drops, on success and on error alike. Directories left behind by a
//! crashed run are recognised by the prefix and swept at the next start.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::archive::ARCHIVE_PREFIX;
use crate::error::{BackupError, BackupResult};

/// Root directory for scratch work
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh scratch directory tagged with `label`
    ///
    /// An archive name is used as the tag directly; other labels get the
    /// archive prefix so the orphan sweep still recognises them.
    pub fn acquire(&self, label: &str) -> BackupResult<TempDir> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create scratch root {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let prefix = if label.starts_with(ARCHIVE_PREFIX) {
            format!("{}-", label)
        } else {
            format!("{}-{}-", ARCHIVE_PREFIX, label)
        };
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.root)
            .map_err(|e| BackupError::Io(format!("Failed to create scratch directory: {}", e)))?;
        debug!(path = %dir.path().display(), "scratch directory acquired");
        Ok(dir)
    }

    /// Remove scratch entries left over from interrupted runs
    ///
    /// Only call this while holding the single-instance lock.
    pub fn sweep_orphans(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(ARCHIVE_PREFIX) {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), "removed orphaned scratch entry");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove orphaned scratch entry"),
            }
        }
        removed
    }
}

/// Drop a scratch guard, logging instead of failing if removal goes wrong
pub fn release(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path().join("scratch"));

        let dir = scratch.acquire("backup").unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("openclaw-aws-backup-backup-"));

        release(dir);
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_with_archive_name() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path().join("scratch"));

        let dir = scratch
            .acquire("openclaw-aws-backup-2025-06-01T12-00-00")
            .unwrap();
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("openclaw-aws-backup-2025-06-01T12-00-00-"));
        assert!(!name.contains("openclaw-aws-backup-openclaw"));

        // still recognised by the orphan sweep
        assert_eq!(scratch.sweep_orphans(), 1);
        assert!(!dir.path().exists());
    }

    #[test]
    fn test_sweep_orphans_by_prefix() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("scratch");
        fs::create_dir_all(root.join("openclaw-aws-backup-restore-abc/x")).unwrap();
        fs::write(root.join("openclaw-aws-backup-old.tar.gz"), b"x").unwrap();
        fs::write(root.join("unrelated.txt"), b"keep").unwrap();

        let scratch = ScratchSpace::new(&root);
        assert_eq!(scratch.sweep_orphans(), 2);
        assert!(root.join("unrelated.txt").exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 1);
    }

    #[test]
    fn test_sweep_without_root() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path().join("missing"));
        assert_eq!(scratch.sweep_orphans(), 0);
    }
}
