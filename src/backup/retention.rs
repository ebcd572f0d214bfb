//! Retention pruning
//!
//! Keeps the `keep` most recent archives by the timestamp in their names and
//! deletes the rest. Deletion is best-effort per archive: failures are
//! collected and reported, never raised.

use tracing::{info, warn};

use super::catalog::{list_archives, RemoteArchiveEntry};
use crate::error::BackupResult;
use crate::store::ObjectStore;

/// Outcome of one pruning pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Names of deleted archives, oldest last
    pub deleted: Vec<String>,
    /// One message per archive that could not be deleted
    pub errors: Vec<String>,
}

impl PruneReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Archives beyond the retention window, newest of them first
pub fn excess_entries(entries: &[RemoteArchiveEntry], keep: u32) -> Vec<&RemoteArchiveEntry> {
    let mut ordered: Vec<&RemoteArchiveEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| b.name.cmp(&a.name));
    ordered.into_iter().skip(keep as usize).collect()
}

pub struct RetentionPruner<'a> {
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    keep: u32,
}

impl<'a> RetentionPruner<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &'a str, keep: u32) -> Self {
        Self {
            store,
            prefix,
            keep: keep.max(1),
        }
    }

    /// Delete everything beyond the newest `keep` archives
    ///
    /// Only a failed listing is an error; individual deletions are not.
    pub fn prune(&self) -> BackupResult<PruneReport> {
        let entries = list_archives(self.store, self.prefix)?;
        let mut report = PruneReport::default();

        let excess = excess_entries(&entries, self.keep);
        if excess.is_empty() {
            info!(count = entries.len(), keep = self.keep, "retention: nothing to prune");
            return Ok(report);
        }

        for entry in excess {
            match self.store.delete(&entry.storage_key) {
                Ok(()) => {
                    info!(name = %entry.name, "retention: deleted old backup");
                    report.deleted.push(entry.name.to_string());
                }
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "retention: delete failed");
                    report.errors.push(format!("{}: {}", entry.name, e));
                }
            }
        }
        Ok(report)
    }
}
