//! Restore orchestrator
//!
//! Downloads, decrypts and extracts an archive entirely in scratch space.
//! Live data is only touched once the extracted tree is known to be good,
//! and the configuration tree is then replaced through [`super::swap`], so a
//! failure rolls back to the previous tree. The workspace is replaced by
//! remove-then-copy without a rollback.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::catalog::{list_archives, select, RemoteArchiveEntry};
use super::scratch::{release, ScratchSpace};
use super::swap::{keep_pre_restore_copy, recover_interrupted, replace_dir, replace_unguarded};
use crate::archive::{parse_object_key, unpack, CONFIG_ENTRY, WORKSPACE_ENTRY};
use crate::config::settings::PRIMARY_CONFIG_FILE;
use crate::config::{BackupConfig, BackupPaths, LiveDataRoot};
use crate::crypto::{EncryptionFilter, KeyResolver};
use crate::error::{BackupError, BackupResult};
use crate::storage::tree::{copy_tree, remove_tree, safe_delete};
use crate::store::ObjectStore;

/// Whether restoring would overwrite existing live data
///
/// Pure: callers use it to decide whether to ask for confirmation.
pub fn would_overwrite(live: &LiveDataRoot) -> bool {
    live.config_dir.exists() || live.workspace_dir.exists()
}

/// Result of a restore operation
#[derive(Debug, Default, Clone)]
pub struct RestoreResult {
    /// Archive that was restored
    pub name: String,
    /// Whether the archive was client-key encrypted
    pub decrypted: bool,
    /// Whether the configuration tree was replaced
    pub config_restored: bool,
    /// Whether the workspace tree was replaced
    pub workspace_restored: bool,
    /// Whether the current primary config file was carried over
    pub preserved_primary_config: bool,
    /// Copy of the configuration tree taken before replacing it
    pub pre_restore_copy: Option<PathBuf>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

impl RestoreResult {
    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.config_restored {
            parts.push("configuration");
        }
        if self.workspace_restored {
            parts.push("workspace");
        }
        if parts.is_empty() {
            return format!("Restored nothing from {}", self.name);
        }
        format!("Restored {} from {}", parts.join(" and "), self.name)
    }
}

pub struct RestoreManager<'a> {
    config: &'a BackupConfig,
    paths: &'a BackupPaths,
    store: &'a dyn ObjectStore,
    keys: &'a dyn KeyResolver,
}

impl<'a> RestoreManager<'a> {
    pub fn new(
        config: &'a BackupConfig,
        paths: &'a BackupPaths,
        store: &'a dyn ObjectStore,
        keys: &'a dyn KeyResolver,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            keys,
        }
    }

    /// Restore candidates, most recently modified first
    ///
    /// An empty namespace is an error here: there is nothing to restore.
    pub fn list_backups(&self) -> BackupResult<Vec<RemoteArchiveEntry>> {
        let entries = list_archives(self.store, &self.config.s3.prefix)?;
        if entries.is_empty() {
            return Err(BackupError::NoBackups(self.config.s3.location()));
        }
        Ok(entries)
    }

    /// Pick one archive by name or `latest`
    pub fn select(&self, selector: &str) -> BackupResult<RemoteArchiveEntry> {
        let entries = self.list_backups()?;
        select(&entries, selector).cloned()
    }

    pub fn would_overwrite(&self) -> BackupResult<bool> {
        Ok(would_overwrite(&self.config.live_data()?))
    }

    /// Replace live data with the archive stored under `storage_key`
    ///
    /// Confirmation is the caller's job; this proceeds unconditionally.
    pub fn restore_backup(&self, storage_key: &str) -> BackupResult<RestoreResult> {
        let (name, _) = parse_object_key(storage_key, &self.config.s3.prefix).ok_or_else(|| {
            BackupError::Validation(format!("Not an archive key: {}", storage_key))
        })?;
        let live = self.config.live_data()?;

        let mut result = RestoreResult {
            name: name.to_string(),
            ..Default::default()
        };
        result.warnings.extend(recover_interrupted(&live.config_dir)?);
        info!(name = %name, "starting restore");

        let scratch = ScratchSpace::new(self.paths.scratch_dir());
        let dir = scratch.acquire("restore")?;
        let outcome = self.restore_in(dir.path(), storage_key, &live, &mut result);
        release(dir);
        outcome?;

        for warning in &result.warnings {
            warn!("{}", warning);
        }
        info!(name = %result.name, "{}", result.summary());
        Ok(result)
    }

    fn restore_in(
        &self,
        scratch: &Path,
        storage_key: &str,
        live: &LiveDataRoot,
        result: &mut RestoreResult,
    ) -> BackupResult<()> {
        // Download
        let archive_path = scratch.join("archive");
        {
            let file = File::create(&archive_path)
                .map_err(|e| BackupError::Io(format!("Failed to create download file: {}", e)))?;
            let mut writer = BufWriter::new(file);
            let bytes = self.store.get(storage_key, &mut writer)?;
            writer
                .flush()
                .map_err(|e| BackupError::Io(format!("Failed to write download file: {}", e)))?;
            debug!(bytes, "archive downloaded");
        }

        // Decrypt
        let filter = EncryptionFilter::new(self.config.encryption_policy(), self.keys);
        result.decrypted = filter.decrypt_after_download(&archive_path)?;

        // Extract
        let extracted = scratch.join("extracted");
        fs::create_dir_all(&extracted)
            .map_err(|e| BackupError::Io(format!("Failed to create extraction directory: {}", e)))?;
        unpack(&archive_path, &extracted)?;
        safe_delete(&archive_path)?;

        let root = locate_data_root(&extracted);
        let config_src = root.join(CONFIG_ENTRY);
        let workspace_src = root.join(WORKSPACE_ENTRY);
        let has_config = config_src.is_dir();
        let has_workspace = workspace_src.is_dir();
        if !has_config && !has_workspace {
            return Err(BackupError::CorruptArchive(format!(
                "archive holds neither {}/ nor {}/",
                CONFIG_ENTRY, WORKSPACE_ENTRY
            )));
        }

        // Validate
        let live_primary = live.primary_config();
        if has_config && !config_src.join(PRIMARY_CONFIG_FILE).is_file() {
            if live_primary.is_file() {
                result.warnings.push(format!(
                    "archive has no {}; keeping the current one",
                    PRIMARY_CONFIG_FILE
                ));
            } else {
                result.warnings.push(format!(
                    "archive has no {} and none exists locally",
                    PRIMARY_CONFIG_FILE
                ));
            }
        }

        // Replace the configuration tree
        if has_config {
            if self.config.restore.keep_pre_restore_copy {
                result.pre_restore_copy = keep_pre_restore_copy(&live.config_dir)?;
            }

            let nested_workspace = live
                .workspace_dir
                .strip_prefix(&live.config_dir)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .map(Path::to_path_buf);
            let mut preserved = false;

            replace_dir(&live.config_dir, |staging| {
                copy_tree(&config_src, staging, None)?;

                let staged_primary = staging.join(PRIMARY_CONFIG_FILE);
                if !staged_primary.exists() && live_primary.is_file() {
                    fs::copy(&live_primary, &staged_primary).map_err(|e| {
                        BackupError::Io(format!("Failed to preserve {}: {}", PRIMARY_CONFIG_FILE, e))
                    })?;
                    preserved = true;
                }

                // A nested workspace moves with the config tree
                if let Some(rel) = &nested_workspace {
                    let staged_workspace = staging.join(rel);
                    if has_workspace {
                        remove_tree(&staged_workspace)?;
                        copy_tree(&workspace_src, &staged_workspace, None)?;
                    } else if live.workspace_dir.is_dir() {
                        remove_tree(&staged_workspace)?;
                        copy_tree(&live.workspace_dir, &staged_workspace, None)?;
                    }
                }
                Ok(())
            })?;

            result.config_restored = true;
            result.preserved_primary_config = preserved;
            result.workspace_restored = has_workspace && nested_workspace.is_some();
            info!(path = %live.config_dir.display(), "configuration restored");
        }

        // Replace the workspace tree
        if has_workspace && !result.workspace_restored {
            replace_unguarded(&workspace_src, &live.workspace_dir)?;
            result.workspace_restored = true;
            info!(path = %live.workspace_dir.display(), "workspace restored");
        }

        Ok(())
    }
}

/// Directory holding the archive entries
///
/// Older archives wrap both entries in a directory named after the archive.
fn locate_data_root(extracted: &Path) -> PathBuf {
    let has_entries =
        |dir: &Path| dir.join(CONFIG_ENTRY).is_dir() || dir.join(WORKSPACE_ENTRY).is_dir();
    if has_entries(extracted) {
        return extracted.to_path_buf();
    }

    let children: Vec<PathBuf> = match fs::read_dir(extracted) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => return extracted.to_path_buf(),
    };
    match children.as_slice() {
        [only] if only.is_dir() && has_entries(only) => only.clone(),
        _ => extracted.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack;
    use crate::backup::manager::BackupManager;
    use crate::backup::test_support::{local_setup, PREFIX};
    use crate::config::EncryptionMethod;
    use crate::crypto::key_derivation::cheap_params;
    use crate::crypto::{SecureString, StaticKeyResolver};
    use crate::storage::tree::test_support::{tree_contents, write_tree};
    use crate::store::{LocalStore, PutRequest};
    use tempfile::TempDir;

    fn keys(pass: &str) -> StaticKeyResolver {
        StaticKeyResolver(SecureString::new(pass))
    }

    fn scratch_is_empty(paths: &BackupPaths) -> bool {
        fs::read_dir(paths.scratch_dir()).unwrap().count() == 0
    }

    /// Upload a hand-built archive with the given trees
    fn upload_archive(
        temp: &Path,
        store: &LocalStore,
        name: &str,
        config_files: Option<&[(&str, &str)]>,
        workspace_files: Option<&[(&str, &str)]>,
    ) -> String {
        let build = temp.join(format!("build-{}", name));
        let mut sources = Vec::new();
        if let Some(files) = config_files {
            let dir = build.join(CONFIG_ENTRY);
            write_tree(&dir, files);
            fs::create_dir_all(&dir).unwrap();
            sources.push(dir);
        }
        if let Some(files) = workspace_files {
            let dir = build.join(WORKSPACE_ENTRY);
            write_tree(&dir, files);
            fs::create_dir_all(&dir).unwrap();
            sources.push(dir);
        }
        let archive = temp.join(format!("{}.tar.gz", name));
        let refs: Vec<&Path> = sources.iter().map(PathBuf::as_path).collect();
        pack(&refs, &archive).unwrap();

        let key = format!("{}/{}.tar.gz", PREFIX, name);
        let mut file = File::open(&archive).unwrap();
        store.put(&key, &mut file, &PutRequest::default()).unwrap();
        key
    }

    #[test]
    fn test_backup_then_restore_round_trip() {
        let temp = TempDir::new().unwrap();
        let (config, paths) = local_setup(temp.path());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let keys = keys("pass");
        let live = config.live_data().unwrap();
        let before = tree_contents(&live.config_dir);

        let outcome = BackupManager::new(&config, &paths, &store, &keys)
            .create_backup()
            .unwrap();

        // drift the live data after the backup
        fs::write(live.primary_config(), "{\"changed\":true}").unwrap();
        fs::write(live.config_dir.join("extra.json"), "{}").unwrap();
        fs::remove_file(live.workspace_dir.join("AGENTS.md")).unwrap();

        let restore = RestoreManager::new(&config, &paths, &store, &keys);
        assert!(restore.would_overwrite().unwrap());
        let result = restore.restore_backup(&outcome.storage_key).unwrap();

        assert!(result.config_restored);
        assert!(result.workspace_restored);
        assert!(!result.preserved_primary_config);
        assert!(result.warnings.is_empty());
        assert_eq!(tree_contents(&live.config_dir), before);
        assert!(scratch_is_empty(&paths));
        // no holding or staging siblings remain
        assert_eq!(fs::read_dir(temp.path().join("home")).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_primary_config_is_preserved_with_warning() {
        let temp = TempDir::new().unwrap();
        let (config, paths) = local_setup(temp.path());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let live = config.live_data().unwrap();
        let original_primary = fs::read(live.primary_config()).unwrap();

        let key = upload_archive(
            temp.path(),
            &store,
            "openclaw-aws-backup-2025-01-01T00-00-00",
            Some(&[("agents/other.json", "restored")]),
            None,
        );

        let keys = keys("unused");
        let result = RestoreManager::new(&config, &paths, &store, &keys)
            .restore_backup(&key)
            .unwrap();

        assert!(result.preserved_primary_config);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains(PRIMARY_CONFIG_FILE));
        assert_eq!(fs::read(live.primary_config()).unwrap(), original_primary);
        assert_eq!(
            fs::read_to_string(live.config_dir.join("agents/other.json")).unwrap(),
            "restored"
        );
        // the nested workspace is carried over untouched
        assert!(live.workspace_dir.join("memory/today.md").is_file());
        assert!(!result.workspace_restored);
    }

    #[test]
    fn test_decrypt_failure_leaves_live_untouched() {
        let temp = TempDir::new().unwrap();
        let (mut config, paths) = local_setup(temp.path());
        config.encryption.enabled = true;
        config.encryption.method = Some(EncryptionMethod::ClientKey);
        config.encryption.key_ref = Some("env:UNUSED".into());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let live = config.live_data().unwrap();

        let right = keys("right");
        let outcome = BackupManager::new(&config, &paths, &store, &right)
            .with_kdf_costs(cheap_params())
            .create_backup()
            .unwrap();

        fs::write(live.primary_config(), "{\"after\":1}").unwrap();
        let before = tree_contents(&live.config_dir);

        let wrong = keys("wrong");
        let result = RestoreManager::new(&config, &paths, &store, &wrong)
            .restore_backup(&outcome.storage_key);

        assert!(matches!(result, Err(BackupError::Decryption(_))));
        assert_eq!(tree_contents(&live.config_dir), before);
        assert!(scratch_is_empty(&paths));

        let result = RestoreManager::new(&config, &paths, &store, &right)
            .restore_backup(&outcome.storage_key)
            .unwrap();
        assert!(result.decrypted);
        assert_ne!(tree_contents(&live.config_dir), before);
    }

    #[test]
    fn test_encrypted_archive_without_client_key_config() {
        let temp = TempDir::new().unwrap();
        let (mut config, paths) = local_setup(temp.path());
        config.encryption.enabled = true;
        config.encryption.method = Some(EncryptionMethod::ClientKey);
        config.encryption.key_ref = Some("env:UNUSED".into());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let keys = keys("k");

        let outcome = BackupManager::new(&config, &paths, &store, &keys)
            .with_kdf_costs(cheap_params())
            .create_backup()
            .unwrap();

        config.encryption.enabled = false;
        config.encryption.method = None;
        let result =
            RestoreManager::new(&config, &paths, &store, &keys).restore_backup(&outcome.storage_key);
        assert!(matches!(result, Err(BackupError::Decryption(_))));
    }

    #[test]
    fn test_corrupt_archive_aborts_before_mutation() {
        let temp = TempDir::new().unwrap();
        let (config, paths) = local_setup(temp.path());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let live = config.live_data().unwrap();
        let before = tree_contents(&live.config_dir);

        let key = format!("{}/openclaw-aws-backup-2025-01-01T00-00-00.tar.gz", PREFIX);
        store
            .put(&key, &mut &b"definitely not gzip"[..], &PutRequest::default())
            .unwrap();

        let keys = keys("k");
        let result = RestoreManager::new(&config, &paths, &store, &keys).restore_backup(&key);
        assert!(matches!(result, Err(BackupError::CorruptArchive(_))));
        assert_eq!(tree_contents(&live.config_dir), before);
        assert!(scratch_is_empty(&paths));
    }

    #[test]
    fn test_workspace_only_archive() {
        let temp = TempDir::new().unwrap();
        let (mut config, paths) = local_setup(temp.path());
        config.workspace_dir = Some(temp.path().join("ws"));
        write_tree(&temp.path().join("ws"), &[("stale.md", "old")]);
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let live = config.live_data().unwrap();
        let config_before = tree_contents(&live.config_dir);

        let key = upload_archive(
            temp.path(),
            &store,
            "openclaw-aws-backup-2025-01-01T00-00-00",
            None,
            Some(&[("fresh.md", "new")]),
        );

        let keys = keys("k");
        let result = RestoreManager::new(&config, &paths, &store, &keys)
            .restore_backup(&key)
            .unwrap();

        assert!(!result.config_restored);
        assert!(result.workspace_restored);
        assert_eq!(tree_contents(&live.config_dir), config_before);
        assert!(live.workspace_dir.join("fresh.md").is_file());
        assert!(!live.workspace_dir.join("stale.md").exists());
    }

    #[test]
    fn test_pre_restore_copy_kept() {
        let temp = TempDir::new().unwrap();
        let (mut config, paths) = local_setup(temp.path());
        config.restore.keep_pre_restore_copy = true;
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let live = config.live_data().unwrap();
        let before = tree_contents(&live.config_dir);

        let key = upload_archive(
            temp.path(),
            &store,
            "openclaw-aws-backup-2025-01-01T00-00-00",
            Some(&[("openclaw.json", "{}")]),
            None,
        );
        let keys = keys("k");
        let result = RestoreManager::new(&config, &paths, &store, &keys)
            .restore_backup(&key)
            .unwrap();

        let copy = result.pre_restore_copy.unwrap();
        assert_eq!(tree_contents(&copy), before);
    }

    #[test]
    fn test_list_and_select() {
        let temp = TempDir::new().unwrap();
        let (config, paths) = local_setup(temp.path());
        let store = LocalStore::open(&temp.path().join("store")).unwrap();
        let keys = keys("k");
        let restore = RestoreManager::new(&config, &paths, &store, &keys);

        assert!(matches!(
            restore.list_backups(),
            Err(BackupError::NoBackups(_))
        ));

        upload_archive(
            temp.path(),
            &store,
            "openclaw-aws-backup-2025-01-01T00-00-00",
            Some(&[("openclaw.json", "{}")]),
            None,
        );
        upload_archive(
            temp.path(),
            &store,
            "openclaw-aws-backup-2025-01-02T00-00-00",
            Some(&[("openclaw.json", "{}")]),
            None,
        );

        assert_eq!(restore.list_backups().unwrap().len(), 2);
        assert_eq!(
            restore.select("latest").unwrap().name.as_str(),
            "openclaw-aws-backup-2025-01-02T00-00-00"
        );
        assert!(restore.select("openclaw-aws-backup-1999-01-01T00-00-00").is_err());
        assert!(matches!(
            restore.restore_backup("elsewhere/file.tar.gz"),
            Err(BackupError::Validation(_))
        ));
    }

    #[test]
    fn test_locate_wrapped_layout() {
        let temp = TempDir::new().unwrap();
        write_tree(
            &temp.path().join("openclaw-aws-backup-x/openclaw-config"),
            &[("openclaw.json", "{}")],
        );
        assert_eq!(
            locate_data_root(temp.path()),
            temp.path().join("openclaw-aws-backup-x")
        );
    }

    #[test]
    fn test_would_overwrite() {
        let temp = TempDir::new().unwrap();
        let live = LiveDataRoot {
            config_dir: temp.path().join("cfg"),
            workspace_dir: temp.path().join("ws"),
        };
        assert!(!would_overwrite(&live));
        fs::create_dir(&live.config_dir).unwrap();
        assert!(would_overwrite(&live));
    }
}
