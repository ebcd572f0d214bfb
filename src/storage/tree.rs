//! Directory tree helpers
//!
//! Recursive copy and removal used when snapshotting live data into scratch
//! space and when building a replacement tree during restore. Source trees
//! are only ever read.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{BackupError, BackupResult};

/// Copy `src` into `dst` recursively, skipping `exclude` and everything below it
///
/// `dst` is created if needed. File permission bits are carried over by
/// `fs::copy`; symlinks are recreated as links rather than followed.
pub fn copy_tree(src: &Path, dst: &Path, exclude: Option<&Path>) -> BackupResult<u64> {
    if !src.is_dir() {
        return Err(BackupError::Io(format!(
            "Source directory not found: {}",
            src.display()
        )));
    }

    fs::create_dir_all(dst)
        .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dst.display(), e)))?;

    let mut files = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| exclude.map_or(true, |ex| entry.path() != ex));

    for entry in walker {
        let entry = entry
            .map_err(|e| BackupError::Io(format!("Failed to walk {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| BackupError::Io(format!("Unexpected path in walk: {}", e)))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                BackupError::Io(format!("Failed to create {}: {}", target.display(), e))
            })?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                BackupError::Io(format!(
                    "Failed to copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> BackupResult<()> {
    let link = fs::read_link(src)
        .map_err(|e| BackupError::Io(format!("Failed to read link {}: {}", src.display(), e)))?;
    std::os::unix::fs::symlink(&link, dst)
        .map_err(|e| BackupError::Io(format!("Failed to create link {}: {}", dst.display(), e)))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> BackupResult<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| BackupError::Io(format!("Failed to copy {}: {}", src.display(), e)))
}

/// Remove a directory tree if it exists
pub fn remove_tree(path: &Path) -> BackupResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)
            .map_err(|e| BackupError::Io(format!("Failed to remove {}: {}", path.display(), e))),
        Ok(_) => fs::remove_file(path)
            .map_err(|e| BackupError::Io(format!("Failed to remove {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to inspect {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Delete a file if it exists
pub fn safe_delete(path: &Path) -> BackupResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{tree_contents, write_tree};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write_tree(&src, &[("a.txt", "a"), ("nested/deep/b.txt", "b")]);
        fs::create_dir_all(src.join("empty")).unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_tree(&src, &dst, None).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(tree_contents(&src), tree_contents(&dst));
        assert!(dst.join("empty").is_dir());
    }

    #[test]
    fn test_copy_tree_exclude() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write_tree(&src, &[("openclaw.json", "{}"), ("workspace/notes.md", "x")]);

        let dst = temp.path().join("dst");
        copy_tree(&src, &dst, Some(&src.join("workspace"))).unwrap();

        assert!(dst.join("openclaw.json").exists());
        assert!(!dst.join("workspace").exists());
    }

    #[test]
    fn test_copy_missing_source() {
        let temp = TempDir::new().unwrap();
        let result = copy_tree(&temp.path().join("nope"), &temp.path().join("dst"), None);
        assert!(matches!(result, Err(BackupError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_symlink_and_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write_tree(&src, &[("secret.key", "k")]);
        fs::set_permissions(src.join("secret.key"), fs::Permissions::from_mode(0o600)).unwrap();
        std::os::unix::fs::symlink("secret.key", src.join("link")).unwrap();

        let dst = temp.path().join("dst");
        copy_tree(&src, &dst, None).unwrap();

        let mode = fs::metadata(dst.join("secret.key")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), Path::new("secret.key"));
    }

    #[test]
    fn test_remove_tree_and_safe_delete_tolerate_missing() {
        let temp = TempDir::new().unwrap();
        remove_tree(&temp.path().join("missing")).unwrap();
        safe_delete(&temp.path().join("missing.tar.gz")).unwrap();

        let dir = temp.path().join("dir");
        write_tree(&dir, &[("x/y.txt", "y")]);
        remove_tree(&dir).unwrap();
        assert!(!dir.exists());
    }
}
