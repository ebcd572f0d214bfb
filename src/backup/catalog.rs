//! Remote archive listing
//!
//! Turns a raw object listing into archive entries. Objects that do not
//! follow the naming convention are skipped.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::archive::{parse_object_key, ArchiveName};
use crate::error::{BackupError, BackupResult};
use crate::store::ObjectStore;

/// Selector meaning "the most recent archive"
pub const LATEST: &str = "latest";

/// One archive in the remote namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArchiveEntry {
    pub name: ArchiveName,
    pub storage_key: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    /// Client-key encrypted, judging by the extension
    pub encrypted: bool,
}

/// List archives under `prefix`, most recently modified first
pub fn list_archives(store: &dyn ObjectStore, prefix: &str) -> BackupResult<Vec<RemoteArchiveEntry>> {
    let list_prefix = format!("{}/", prefix.trim_end_matches('/'));
    let mut entries: Vec<RemoteArchiveEntry> = Vec::new();

    for object in store.list(&list_prefix)? {
        let (name, encrypted) = match parse_object_key(&object.key, prefix) {
            Some(parsed) => parsed,
            None => continue,
        };
        if let Some(existing) = entries.iter().find(|e| e.name == name) {
            warn!(
                kept = %existing.storage_key,
                ignored = %object.key,
                "two objects share one archive name"
            );
            continue;
        }
        entries.push(RemoteArchiveEntry {
            name,
            storage_key: object.key,
            last_modified: object.last_modified,
            size_bytes: object.size,
            encrypted,
        });
    }

    entries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(entries)
}

/// Find an archive by name (with or without extension) or by [`LATEST`]
///
/// "Latest" means newest by the timestamp in the name, not by upload time.
pub fn select<'a>(
    entries: &'a [RemoteArchiveEntry],
    selector: &str,
) -> BackupResult<&'a RemoteArchiveEntry> {
    if selector == LATEST {
        return entries
            .iter()
            .max_by(|a, b| a.name.cmp(&b.name))
            .ok_or_else(|| BackupError::NoBackups("remote namespace".into()));
    }

    entries
        .iter()
        .find(|e| {
            e.name.as_str() == selector
                || e.storage_key == selector
                || e.storage_key.rsplit('/').next() == Some(selector)
        })
        .ok_or_else(|| BackupError::backup_not_found(selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalStore, PutRequest};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn put(store: &LocalStore, key: &str) {
        store
            .put(key, &mut &b"data"[..], &PutRequest::default())
            .unwrap();
    }

    #[test]
    fn test_list_skips_foreign_objects() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).unwrap();
        put(&store, "pfx/openclaw-aws-backup-2025-01-01T00-00-00.tar.gz");
        put(&store, "pfx/openclaw-aws-backup-2025-01-02T00-00-00.tar.gz.enc");
        put(&store, "pfx/notes.txt");
        put(&store, "pfx/nested/openclaw-aws-backup-2025-01-03T00-00-00.tar.gz");
        put(&store, "pfx-other/openclaw-aws-backup-2025-01-04T00-00-00.tar.gz");

        let entries = list_archives(&store, "pfx").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.encrypted));
        assert!(entries.iter().all(|e| e.size_bytes == 4));
    }

    fn entry(name: &str, modified_day: u32) -> RemoteArchiveEntry {
        RemoteArchiveEntry {
            name: ArchiveName::parse(name).unwrap(),
            storage_key: format!("pfx/{}.tar.gz", name),
            last_modified: Utc.with_ymd_and_hms(2025, 2, modified_day, 0, 0, 0).unwrap(),
            size_bytes: 1,
            encrypted: false,
        }
    }

    #[test]
    fn test_select() {
        let entries = vec![
            entry("openclaw-aws-backup-2025-01-01T00-00-00", 5),
            entry("openclaw-aws-backup-2025-01-03T00-00-00", 1),
            entry("openclaw-aws-backup-2025-01-02T00-00-00", 9),
        ];

        assert_eq!(
            select(&entries, LATEST).unwrap().name.as_str(),
            "openclaw-aws-backup-2025-01-03T00-00-00"
        );
        assert_eq!(
            select(&entries, "openclaw-aws-backup-2025-01-01T00-00-00.tar.gz")
                .unwrap()
                .storage_key,
            "pfx/openclaw-aws-backup-2025-01-01T00-00-00.tar.gz"
        );
        assert!(select(&entries, "nope").unwrap_err().is_not_found());
        assert!(matches!(
            select(&[], LATEST),
            Err(BackupError::NoBackups(_))
        ));
    }
}
