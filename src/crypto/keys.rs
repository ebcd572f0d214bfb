//! Key reference resolution
//!
//! A client-key configuration names where its passphrase lives rather than
//! storing it. Supported references:
//!
//! - `env:VAR`: the value of environment variable `VAR`
//! - `file:/path`: the trimmed contents of a file
//! - `prompt`: ask on the terminal

use std::fs;

use super::SecureString;
use crate::error::{BackupError, BackupResult};

/// Turns a key reference into a usable passphrase
pub trait KeyResolver {
    fn resolve(&self, key_ref: &str) -> BackupResult<SecureString>;
}

/// Resolves references against the local environment
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalKeyResolver;

impl KeyResolver for LocalKeyResolver {
    fn resolve(&self, key_ref: &str) -> BackupResult<SecureString> {
        let passphrase = if let Some(var) = key_ref.strip_prefix("env:") {
            std::env::var(var).map_err(|_| {
                BackupError::Encryption(format!(
                    "key unavailable: environment variable {} is not set",
                    var
                ))
            })?
        } else if let Some(path) = key_ref.strip_prefix("file:") {
            let contents = fs::read_to_string(path).map_err(|e| {
                BackupError::Encryption(format!("key unavailable: cannot read {}: {}", path, e))
            })?;
            contents.trim_end_matches(['\r', '\n']).to_string()
        } else if key_ref == "prompt" {
            rpassword::prompt_password("Backup passphrase: ").map_err(|e| {
                BackupError::Encryption(format!("Failed to read passphrase: {}", e))
            })?
        } else {
            return Err(BackupError::Encryption(format!(
                "unsupported key reference '{}' (expected env:VAR, file:/path or prompt)",
                key_ref
            )));
        };

        if passphrase.is_empty() {
            return Err(BackupError::Encryption(format!(
                "key unavailable: '{}' resolved to an empty passphrase",
                key_ref
            )));
        }
        Ok(SecureString::new(passphrase))
    }
}

/// Fixed passphrase, for callers that already hold the secret
pub struct StaticKeyResolver(pub SecureString);

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, _key_ref: &str) -> BackupResult<SecureString> {
        Ok(SecureString::new(self.0.as_str()))
    }
}
