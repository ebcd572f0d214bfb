//! Atomic directory replacement
//!
//! The replacement tree is built completely in a sibling staging directory.
//! Only then is the live directory renamed aside to a holding name and the
//! staging directory renamed into place. Both renames are on the same
//! filesystem, so the live path is missing only between two `rename` calls.
//! The holding directory is deleted last, after the new tree is in place.
//!
//! Sibling names, for a live directory `/home/u/.openclaw`:
//!
//! - `/home/u/.openclaw.restore-new-<millis>`: staging
//! - `/home/u/.openclaw.restore-hold-<millis>`: holding
//! - `/home/u/.openclaw.pre-restore-<millis>`: optional kept copy

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::storage::tree::{copy_tree, remove_tree};

const STAGING_TAG: &str = "restore-new";
const HOLDING_TAG: &str = "restore-hold";
const PRE_RESTORE_TAG: &str = "pre-restore";

fn sibling(live: &Path, tag: &str, millis: i64) -> PathBuf {
    let mut name: OsString = live.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{}", tag, millis));
    live.with_file_name(name)
}

/// Siblings of `live` carrying `tag`, with their millisecond stamps
fn tagged_siblings(live: &Path, tag: &str) -> Vec<(i64, PathBuf)> {
    let parent = match live.parent() {
        Some(parent) => parent,
        None => return Vec::new(),
    };
    let base = match live.file_name() {
        Some(name) => format!("{}.{}-", name.to_string_lossy(), tag),
        None => return Vec::new(),
    };
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut found: Vec<(i64, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let millis = name.strip_prefix(&base)?.parse::<i64>().ok()?;
            Some((millis, entry.path()))
        })
        .collect();
    found.sort();
    found
}

/// Copy the live tree to a timestamped sibling that is never removed automatically
pub fn keep_pre_restore_copy(live: &Path) -> BackupResult<Option<PathBuf>> {
    if !live.is_dir() {
        return Ok(None);
    }
    let target = sibling(live, PRE_RESTORE_TAG, Utc::now().timestamp_millis());
    copy_tree(live, &target, None)?;
    info!(path = %target.display(), "saved pre-restore copy");
    Ok(Some(target))
}

/// Repair what an interrupted replacement left behind
///
/// If the live directory is missing while a holding directory exists, the
/// swap was cut off between its two renames and the newest holding
/// directory is renamed back. Staging directories are always partial or
/// superseded and are removed, as are holding directories once live exists.
pub fn recover_interrupted(live: &Path) -> BackupResult<Vec<String>> {
    let mut notes = Vec::new();

    let mut holdings = tagged_siblings(live, HOLDING_TAG);
    if !live.exists() {
        if let Some((_, newest)) = holdings.pop() {
            fs::rename(&newest, live).map_err(|e| {
                BackupError::Io(format!(
                    "Failed to recover {} from {}: {}",
                    live.display(),
                    newest.display(),
                    e
                ))
            })?;
            let note = format!(
                "recovered {} from an interrupted restore ({})",
                live.display(),
                newest.display()
            );
            warn!("{}", note);
            notes.push(note);
        }
    }

    for (_, path) in holdings
        .into_iter()
        .chain(tagged_siblings(live, STAGING_TAG))
    {
        match remove_tree(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed leftover restore directory");
                notes.push(format!("removed leftover {}", path.display()));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove leftover restore directory"),
        }
    }

    Ok(notes)
}

/// Replace `live` with a tree produced by `populate`
///
/// `populate` receives the empty staging directory. If it fails, the staging
/// directory is removed and `live` is untouched. If the swap itself fails,
/// the previous tree is renamed back before the error is returned.
pub fn replace_dir<F>(live: &Path, populate: F) -> BackupResult<()>
where
    F: FnOnce(&Path) -> BackupResult<()>,
{
    replace_dir_with(live, populate, &|from, to| fs::rename(from, to))
}

fn replace_dir_with<F>(
    live: &Path,
    populate: F,
    rename: &dyn Fn(&Path, &Path) -> io::Result<()>,
) -> BackupResult<()>
where
    F: FnOnce(&Path) -> BackupResult<()>,
{
    let millis = Utc::now().timestamp_millis();
    let staging = sibling(live, STAGING_TAG, millis);
    let holding = sibling(live, HOLDING_TAG, millis);

    remove_tree(&staging)?;
    fs::create_dir_all(&staging).map_err(|e| {
        BackupError::Io(format!("Failed to create {}: {}", staging.display(), e))
    })?;

    if let Err(e) = populate(&staging) {
        let _ = remove_tree(&staging);
        return Err(e);
    }

    let had_live = live.exists();
    if had_live {
        if let Err(e) = rename(live, &holding) {
            let _ = remove_tree(&staging);
            return Err(BackupError::Io(format!(
                "Failed to move {} aside: {}",
                live.display(),
                e
            )));
        }
    }

    if let Err(e) = rename(&staging, live) {
        let _ = remove_tree(live);
        if had_live {
            rename(&holding, live).map_err(|re| {
                BackupError::Io(format!(
                    "Swap failed ({}) and rollback failed ({}); previous data is at {}",
                    e,
                    re,
                    holding.display()
                ))
            })?;
            warn!(path = %live.display(), "swap failed, previous tree restored");
        }
        let _ = remove_tree(&staging);
        return Err(BackupError::Io(format!(
            "Failed to move new tree into {}: {}",
            live.display(),
            e
        )));
    }

    if had_live {
        if let Err(e) = remove_tree(&holding) {
            warn!(path = %holding.display(), error = %e, "previous tree left in place");
        }
    }
    Ok(())
}

/// Remove `target` and copy `source` into its place, with no rollback
pub fn replace_unguarded(source: &Path, target: &Path) -> BackupResult<u64> {
    remove_tree(target)?;
    copy_tree(source, target, None)
}
