//! Encryption filter applied to archive files around transfer
//!
//! The variant is chosen once from configuration. `ManagedKey` never touches
//! bytes locally: it only contributes server-side encryption parameters to
//! the upload request. `ClientKey` rewrites the archive file in place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::encryption::{decrypt_stream, encrypt_stream, is_encrypted, DEFAULT_CHUNK_SIZE, MAGIC};
use super::key_derivation::KeyDerivationParams;
use super::keys::KeyResolver;
use crate::config::EncryptionMethod;
use crate::error::{BackupError, BackupResult};
use crate::store::ServerSideEncryption;

/// The encryption variant for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionPolicy {
    None,
    /// Server-side encryption with a referenced key id or alias
    ManagedKey { key_id: String },
    /// Local encryption with a passphrase resolved from `key_ref`
    ClientKey { key_ref: String },
}

impl EncryptionPolicy {
    pub fn method(&self) -> EncryptionMethod {
        match self {
            Self::None => EncryptionMethod::None,
            Self::ManagedKey { .. } => EncryptionMethod::ManagedKey,
            Self::ClientKey { .. } => EncryptionMethod::ClientKey,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether archives are encrypted before they leave the machine
    pub fn encrypts_locally(&self) -> bool {
        matches!(self, Self::ClientKey { .. })
    }

    /// Per-request parameters for the object store
    pub fn server_side(&self) -> Option<ServerSideEncryption> {
        match self {
            Self::ManagedKey { key_id } => Some(ServerSideEncryption {
                key_id: key_id.clone(),
            }),
            _ => None,
        }
    }
}

/// Applies an [`EncryptionPolicy`] to archive files
pub struct EncryptionFilter<'a> {
    policy: EncryptionPolicy,
    keys: &'a dyn KeyResolver,
    kdf: KeyDerivationParams,
    chunk_size: u32,
}

impl<'a> EncryptionFilter<'a> {
    pub fn new(policy: EncryptionPolicy, keys: &'a dyn KeyResolver) -> Self {
        Self {
            policy,
            keys,
            kdf: KeyDerivationParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the Argon2 cost parameters (the salt is always fresh)
    pub fn with_kdf_costs(mut self, kdf: KeyDerivationParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    /// Encrypt the archive at `path` in place; returns whether it changed
    pub fn encrypt_for_upload(&self, path: &Path) -> BackupResult<bool> {
        let key_ref = match &self.policy {
            EncryptionPolicy::ClientKey { key_ref } => key_ref,
            EncryptionPolicy::ManagedKey { .. } | EncryptionPolicy::None => return Ok(false),
        };

        let passphrase = self.keys.resolve(key_ref)?;
        let params = self.kdf.with_fresh_salt();
        let chunk_size = self.chunk_size;

        rewrite_in_place(path, "enc", |reader, writer| {
            encrypt_stream(reader, writer, &passphrase, &params, chunk_size).map(|_| ())
        })
        .map_err(|e| match e {
            BackupError::Io(msg) => BackupError::Encryption(msg),
            other => other,
        })?;

        debug!(path = %path.display(), "archive encrypted with client key");
        Ok(true)
    }

    /// Decrypt a downloaded archive in place if it carries the envelope
    ///
    /// Returns whether decryption happened. The file is untouched on error.
    pub fn decrypt_after_download(&self, path: &Path) -> BackupResult<bool> {
        if !file_is_encrypted(path)? {
            if self.policy.encrypts_locally() {
                warn!(
                    path = %path.display(),
                    "client-key encryption is configured but the archive is plaintext"
                );
            }
            return Ok(false);
        }

        let key_ref = match &self.policy {
            EncryptionPolicy::ClientKey { key_ref } => key_ref,
            _ => {
                return Err(BackupError::Decryption(
                    "archive is client-key encrypted but no client key is configured".into(),
                ))
            }
        };

        let passphrase = self
            .keys
            .resolve(key_ref)
            .map_err(|e| BackupError::Decryption(e.to_string()))?;

        rewrite_in_place(path, "dec", |reader, writer| {
            decrypt_stream(reader, writer, &passphrase).map(|_| ())
        })?;

        debug!(path = %path.display(), "archive decrypted with client key");
        Ok(true)
    }
}

/// Peek at the first bytes of a file for the envelope magic
pub fn file_is_encrypted(path: &Path) -> BackupResult<bool> {
    let file = File::open(path)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut head = Vec::with_capacity(MAGIC.len());
    file.take(MAGIC.len() as u64)
        .read_to_end(&mut head)
        .map_err(|e| BackupError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(is_encrypted(&head))
}

/// Stream `path` through `transform` into a sibling file, then rename over it
fn rewrite_in_place<F>(path: &Path, suffix: &str, transform: F) -> BackupResult<()>
where
    F: FnOnce(&mut BufReader<File>, &mut BufWriter<File>) -> BackupResult<()>,
{
    let temp_path = sibling(path, suffix);

    let result = (|| {
        let input = File::open(path)
            .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        let output = File::create(&temp_path).map_err(|e| {
            BackupError::Io(format!("Failed to create {}: {}", temp_path.display(), e))
        })?;
        let mut reader = BufReader::new(input);
        let mut writer = BufWriter::new(output);
        transform(&mut reader, &mut writer)?;
        let output = writer
            .into_inner()
            .map_err(|e| BackupError::Io(format!("Failed to flush {}: {}", temp_path.display(), e)))?;
        output
            .sync_all()
            .map_err(|e| BackupError::Io(format!("Failed to sync {}: {}", temp_path.display(), e)))?;
        fs::rename(&temp_path, path).map_err(|e| {
            BackupError::Io(format!("Failed to replace {}: {}", path.display(), e))
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", suffix));
    path.with_file_name(name)
}
