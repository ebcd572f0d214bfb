//! Backup orchestrator
//!
//! Runs the create-backup sequence in strict order. A failure anywhere up to
//! and including the upload aborts the run; the scratch directory holding
//! the snapshot and the archive is removed before the error propagates.
//! Retention and the metadata record run after the archive is durably
//! stored, so their failures only produce warnings.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::catalog::{list_archives, RemoteArchiveEntry};
use super::metadata::{BackupMetadata, MetadataStore};
use super::retention::{PruneReport, RetentionPruner};
use super::scratch::{release, ScratchSpace};
use crate::archive::{pack, ArchiveName, CONFIG_ENTRY, PLAIN_EXT, WORKSPACE_ENTRY};
use crate::config::{BackupConfig, BackupPaths, LiveDataRoot};
use crate::crypto::{EncryptionFilter, EncryptionPolicy, KeyDerivationParams, KeyResolver};
use crate::error::{BackupError, BackupResult};
use crate::storage::tree::copy_tree;
use crate::store::{ObjectStore, PutRequest};

/// Version tag attached to every upload
const BACKUP_FORMAT_VERSION: &str = "2.0";

/// Upper bound on `-N` suffixes tried for one second
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Result of a successful backup
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub name: String,
    pub storage_key: String,
    /// Size of the uploaded object
    pub size_bytes: u64,
    pub remote_location: String,
    pub encrypted: bool,
    /// `None` when automatic pruning is disabled or failed to list
    pub pruned: Option<PruneReport>,
    /// Non-fatal problems from retention and metadata recording
    pub warnings: Vec<String>,
}

pub struct BackupManager<'a> {
    config: &'a BackupConfig,
    paths: &'a BackupPaths,
    store: &'a dyn ObjectStore,
    keys: &'a dyn KeyResolver,
    kdf: KeyDerivationParams,
}

impl<'a> BackupManager<'a> {
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
            kdf: KeyDerivationParams::default(),
        }
    }

    /// Override Argon2 costs for client-key archives
    pub fn with_kdf_costs(mut self, kdf: KeyDerivationParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Create, upload and record a backup of the live data
    pub fn create_backup(&self) -> BackupResult<BackupOutcome> {
        self.create_backup_at(Utc::now())
    }

    /// Same as [`create_backup`](Self::create_backup) with an explicit clock
    pub fn create_backup_at(&self, now: DateTime<Utc>) -> BackupResult<BackupOutcome> {
        let policy = self.config.encryption_policy();
        let encrypted = policy.encrypts_locally();
        let prefix = self.config.s3.prefix.as_str();

        let name = self.next_free_name(now)?;
        let storage_key = name.object_key(prefix, encrypted);
        info!(name = %name, encryption = %policy.method(), "starting backup");

        let live = self.config.live_data()?;
        let scratch = ScratchSpace::new(self.paths.scratch_dir());
        let dir = scratch.acquire(name.as_str())?;
        let uploaded = self.package_and_upload(&name, &storage_key, &live, &policy, now, dir.path());
        release(dir);
        let size_bytes = uploaded?;

        let remote_location = self.store.location(&storage_key);
        info!(name = %name, size_bytes, location = %remote_location, "backup uploaded");

        let mut outcome = BackupOutcome {
            name: name.to_string(),
            storage_key,
            size_bytes,
            remote_location,
            encrypted: policy.is_enabled(),
            pruned: None,
            warnings: Vec::new(),
        };

        if self.config.retention.auto_clean {
            match self.prune_old_backups() {
                Ok(report) => {
                    outcome
                        .warnings
                        .extend(report.errors.iter().map(|e| format!("retention: {}", e)));
                    outcome.pruned = Some(report);
                }
                Err(e) => {
                    warn!(error = %e, "retention skipped");
                    outcome.warnings.push(format!("retention skipped: {}", e));
                }
            }
        }

        let metadata = BackupMetadata {
            name: outcome.name.clone(),
            timestamp: now,
            instance_id: self.config.instance_id.clone(),
            region: self.config.region.clone(),
            size_bytes,
            remote_location: outcome.remote_location.clone(),
            encrypted: outcome.encrypted,
            encryption_method: policy.method(),
            kms_key_alias: match &policy {
                EncryptionPolicy::ManagedKey { key_id } => Some(key_id.clone()),
                _ => None,
            },
        };
        if let Err(e) = MetadataStore::new(self.paths.metadata_dir()).record(&metadata) {
            warn!(error = %e, "metadata record not written");
            outcome.warnings.push(format!("metadata not recorded: {}", e));
        }

        Ok(outcome)
    }

    /// Remote archives, most recently modified first
    pub fn list_backups(&self) -> BackupResult<Vec<RemoteArchiveEntry>> {
        list_archives(self.store, &self.config.s3.prefix)
    }

    /// Apply the retention window now
    pub fn prune_old_backups(&self) -> BackupResult<PruneReport> {
        RetentionPruner::new(self.store, &self.config.s3.prefix, self.config.retention.keep).prune()
    }

    /// First name for `now` with no remote object under either extension
    fn next_free_name(&self, now: DateTime<Utc>) -> BackupResult<ArchiveName> {
        let base = ArchiveName::at(now);
        let prefix = &self.config.s3.prefix;
        for sequence in 0..MAX_NAME_ATTEMPTS {
            let candidate = base.with_sequence(sequence);
            let taken = self.store.exists(&candidate.object_key(prefix, false))?
                || self.store.exists(&candidate.object_key(prefix, true))?;
            if !taken {
                if sequence > 0 {
                    debug!(name = %candidate, "name taken in this second, using suffix");
                }
                return Ok(candidate);
            }
        }
        Err(BackupError::Validation(format!(
            "No free archive name for {}",
            base
        )))
    }

    /// Snapshot, package, encrypt and upload. Returns the uploaded size.
    fn package_and_upload(
        &self,
        name: &ArchiveName,
        storage_key: &str,
        live: &LiveDataRoot,
        policy: &EncryptionPolicy,
        now: DateTime<Utc>,
        scratch: &Path,
    ) -> BackupResult<u64> {
        let sources = snapshot(live, scratch)?;

        let archive_path = scratch.join(format!("{}.{}", name, PLAIN_EXT));
        let source_refs: Vec<&Path> = sources.iter().map(PathBuf::as_path).collect();
        let packed = pack(&source_refs, &archive_path)?;
        debug!(bytes = packed, "archive packed");

        let filter = EncryptionFilter::new(policy.clone(), self.keys).with_kdf_costs(self.kdf.clone());
        filter.encrypt_for_upload(&archive_path)?;

        let size_bytes = std::fs::metadata(&archive_path)
            .map_err(|e| BackupError::Io(format!("Failed to stat archive: {}", e)))?
            .len();

        let mut metadata = BTreeMap::new();
        metadata.insert("backup-version".to_string(), BACKUP_FORMAT_VERSION.to_string());
        metadata.insert("instance-id".to_string(), self.config.instance_id.clone());
        metadata.insert("timestamp".to_string(), now.to_rfc3339());
        metadata.insert("encrypted".to_string(), policy.is_enabled().to_string());
        metadata.insert("encryption-method".to_string(), policy.method().to_string());
        let request = PutRequest {
            metadata,
            server_side: policy.server_side(),
        };

        let file = File::open(&archive_path)
            .map_err(|e| BackupError::Io(format!("Failed to open archive: {}", e)))?;
        let mut reader = BufReader::new(file);
        self.store.put(storage_key, &mut reader, &request)?;
        Ok(size_bytes)
    }
}

/// Copy the live trees into `scratch` as archive entries
///
/// A workspace nested in the config tree is stored once, as `workspace/`.
fn snapshot(live: &LiveDataRoot, scratch: &Path) -> BackupResult<Vec<PathBuf>> {
    let has_config = live.config_dir.is_dir();
    let has_workspace = live.workspace_dir.is_dir();
    if !has_config && !has_workspace {
        return Err(BackupError::Io(format!(
            "Nothing to back up: {} does not exist",
            live.config_dir.display()
        )));
    }

    let mut sources = Vec::new();
    if has_config {
        let target = scratch.join(CONFIG_ENTRY);
        let exclude = if live.workspace_nested() {
            Some(live.workspace_dir.as_path())
        } else {
            None
        };
        let files = copy_tree(&live.config_dir, &target, exclude)?;
        debug!(files, "configuration snapshot taken");
        sources.push(target);
    } else {
        warn!(path = %live.config_dir.display(), "configuration tree missing, backing up workspace only");
    }

    if has_workspace {
        let target = scratch.join(WORKSPACE_ENTRY);
        let files = copy_tree(&live.workspace_dir, &target, None)?;
        debug!(files, "workspace snapshot taken");
        sources.push(target);
    }
    Ok(sources)
}
