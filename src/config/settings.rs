//! Backup configuration record
//!
//! The configuration is a single JSON record under the state directory. It is
//! loaded and validated once per invocation and then handed by reference to
//! the orchestrators; nothing in the crate mutates it afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::paths::{home_dir, BackupPaths};
use crate::crypto::EncryptionPolicy;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// Name of the primary configuration file inside the config tree
pub const PRIMARY_CONFIG_FILE: &str = "openclaw.json";

/// How archives are protected at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionMethod {
    #[default]
    None,
    /// Server-side encryption with a provider-managed key
    #[serde(alias = "kms")]
    ManagedKey,
    /// Local AES-256-GCM before upload
    ClientKey,
}

impl std::fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::ManagedKey => "managed-key",
            Self::ClientKey => "client-key",
        };
        f.write_str(s)
    }
}

/// Encryption settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub method: Option<EncryptionMethod>,

    /// Key alias or id handed to the object store for managed-key encryption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_alias: Option<String>,

    /// Where the client-key passphrase comes from (`env:VAR`, `file:/path`, `prompt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ref: Option<String>,
}

/// Which object store implementation backs the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    /// A local directory standing in for a bucket
    Local,
}

/// Object store namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub bucket: String,

    pub prefix: String,

    /// Custom S3-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Root directory for the local backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl StoreSettings {
    /// Human-readable location of the namespace, e.g. `s3://bucket/prefix/`
    pub fn location(&self) -> String {
        match self.backend {
            StoreBackend::S3 => format!("s3://{}/{}/", self.bucket, self.prefix),
            StoreBackend::Local => format!(
                "file://{}/{}/",
                self.local_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.prefix
            ),
        }
    }
}

/// Retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSettings {
    /// Number of most recent archives to keep
    pub keep: u32,
    /// Prune automatically after each successful backup
    #[serde(default = "default_true")]
    pub auto_clean: bool,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            keep: 30,
            auto_clean: true,
        }
    }
}

/// Restore behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSettings {
    /// Keep a full copy of the config tree next to it before replacing
    #[serde(default = "default_true")]
    pub keep_pre_restore_copy: bool,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            keep_pre_restore_copy: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The backup configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Identifies the machine being backed up; resolved from the host if empty
    #[serde(default)]
    pub instance_id: String,

    /// Storage region; resolved from the environment if empty
    #[serde(default)]
    pub region: String,

    /// Live configuration tree (defaults to `~/.openclaw`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,

    /// Workspace tree (defaults to `<dataRoot>/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    #[serde(alias = "storage")]
    pub s3: StoreSettings,

    #[serde(default)]
    pub encryption: EncryptionSettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub restore: RestoreSettings,
}

/// The two live trees the tool backs up and restores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDataRoot {
    pub config_dir: PathBuf,
    pub workspace_dir: PathBuf,
}

impl LiveDataRoot {
    /// Whether the workspace lives inside the config tree
    pub fn workspace_nested(&self) -> bool {
        self.workspace_dir.starts_with(&self.config_dir)
    }

    pub fn primary_config(&self) -> PathBuf {
        self.config_dir.join(PRIMARY_CONFIG_FILE)
    }
}

impl BackupConfig {
    /// Build a fresh configuration for a bucket, with the default prefix layout
    pub fn new(bucket: impl Into<String>, instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        Self {
            s3: StoreSettings {
                backend: StoreBackend::S3,
                bucket: bucket.into(),
                prefix: format!("openclaw-aws-backups/instance-{}", instance_id),
                endpoint: None,
                local_path: None,
            },
            instance_id,
            region: String::new(),
            data_root: None,
            workspace_dir: None,
            encryption: EncryptionSettings::default(),
            retention: RetentionSettings::default(),
            restore: RestoreSettings::default(),
        }
    }

    /// Load and validate the configuration record
    pub fn load(paths: &BackupPaths) -> BackupResult<Self> {
        let path = paths.config_file();
        if !path.exists() {
            return Err(BackupError::ConfigMissing(path.display().to_string()));
        }

        let mut config: BackupConfig = read_json_required(&path)
            .map_err(|e| BackupError::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        for warning in config.normalize_and_validate()? {
            warn!("{}", warning);
        }
        Ok(config)
    }

    /// Save the configuration record
    pub fn save(&self, paths: &BackupPaths) -> BackupResult<()> {
        paths.ensure_directories()?;
        write_json_atomic(paths.config_file(), self)
    }

    /// Enforce the configuration invariants, returning non-fatal warnings
    pub fn normalize_and_validate(&mut self) -> BackupResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.retention.keep < 1 {
            return Err(BackupError::Config(
                "retention.keep must be at least 1".into(),
            ));
        }

        self.s3.prefix = self.s3.prefix.trim_matches('/').to_string();
        if self.s3.prefix.is_empty() {
            return Err(BackupError::Config("s3.prefix must not be empty".into()));
        }

        match self.s3.backend {
            StoreBackend::S3 => {
                if !validate_bucket_name(&self.s3.bucket) {
                    return Err(BackupError::Config(format!(
                        "Invalid bucket name: '{}'",
                        self.s3.bucket
                    )));
                }
            }
            StoreBackend::Local => {
                if self.s3.local_path.is_none() {
                    return Err(BackupError::Config(
                        "s3.localPath is required for the local backend".into(),
                    ));
                }
            }
        }

        // Replacing the workspace would otherwise delete the data root with it
        if self.workspace_dir.is_some() {
            if let Ok(live) = self.live_data() {
                if live.config_dir.starts_with(&live.workspace_dir) {
                    return Err(BackupError::Config(format!(
                        "workspaceDir {} must not be or contain dataRoot {}",
                        live.workspace_dir.display(),
                        live.config_dir.display()
                    )));
                }
            }
        }

        let method = self.encryption.method.unwrap_or_default();
        if self.encryption.enabled {
            match method {
                EncryptionMethod::None => {
                    return Err(BackupError::Config(
                        "encryption is enabled but no method is set".into(),
                    ));
                }
                EncryptionMethod::ManagedKey if self.encryption.kms_key_alias.is_none() => {
                    return Err(BackupError::Config(
                        "managed-key encryption requires encryption.kmsKeyAlias".into(),
                    ));
                }
                EncryptionMethod::ClientKey if self.encryption.key_ref.is_none() => {
                    return Err(BackupError::Config(
                        "client-key encryption requires encryption.keyRef".into(),
                    ));
                }
                _ => {}
            }
        } else if method != EncryptionMethod::None {
            warnings.push(format!(
                "encryption.method is '{}' but encryption is disabled; treating as none",
                method
            ));
            self.encryption.method = Some(EncryptionMethod::None);
        }

        Ok(warnings)
    }

    /// The encryption variant for this run
    pub fn encryption_policy(&self) -> EncryptionPolicy {
        if !self.encryption.enabled {
            return EncryptionPolicy::None;
        }
        match self.encryption.method.unwrap_or_default() {
            EncryptionMethod::None => EncryptionPolicy::None,
            EncryptionMethod::ManagedKey => EncryptionPolicy::ManagedKey {
                key_id: self.encryption.kms_key_alias.clone().unwrap_or_default(),
            },
            EncryptionMethod::ClientKey => EncryptionPolicy::ClientKey {
                key_ref: self.encryption.key_ref.clone().unwrap_or_default(),
            },
        }
    }

    /// Resolve the live config and workspace trees
    pub fn live_data(&self) -> BackupResult<LiveDataRoot> {
        let config_dir = match &self.data_root {
            Some(root) => root.clone(),
            None => home_dir()?.join(".openclaw"),
        };
        let workspace_dir = self
            .workspace_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("workspace"));
        Ok(LiveDataRoot {
            config_dir,
            workspace_dir,
        })
    }
}

/// S3 bucket naming rules
pub fn validate_bucket_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 63 || name.contains("..") {
        return false;
    }
    let bytes = name.as_bytes();
    let valid_edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    valid_edge(bytes[0])
        && valid_edge(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|&b| valid_edge(b) || b == b'.' || b == b'-')
}
