//! Pre-flight checks
//!
//! Exercises every collaborator a backup needs without touching live data:
//! the configuration, list access to the namespace, a canary object round
//! trip (with server-side encryption when configured) and the client key.

use std::io::Cursor;

use tracing::debug;
use uuid::Uuid;

use crate::backup::list_archives;
use crate::config::BackupConfig;
use crate::crypto::{decrypt_stream, encrypt_stream, EncryptionPolicy, KeyDerivationParams, KeyResolver};
use crate::error::{BackupError, BackupResult};
use crate::store::{ObjectStore, PutRequest};

const CANARY_BODY: &[u8] = b"openclaw-backup canary";

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    fn from_result(name: &'static str, result: BackupResult<String>) -> Self {
        match result {
            Ok(message) => Self {
                name,
                passed: true,
                message,
            },
            Err(e) => Self {
                name,
                passed: false,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct SelfTestReport {
    pub checks: Vec<CheckResult>,
}

impl SelfTestReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

pub struct SelfTest<'a> {
    config: &'a BackupConfig,
    store: &'a dyn ObjectStore,
    keys: &'a dyn KeyResolver,
    kdf: KeyDerivationParams,
}

impl<'a> SelfTest<'a> {
    pub fn new(config: &'a BackupConfig, store: &'a dyn ObjectStore, keys: &'a dyn KeyResolver) -> Self {
        Self {
            config,
            store,
            keys,
            kdf: KeyDerivationParams::default(),
        }
    }

    pub fn with_kdf_costs(mut self, kdf: KeyDerivationParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Run every check; later checks still run when earlier ones fail
    pub fn run(&self) -> SelfTestReport {
        let checks = vec![
            CheckResult::from_result("configuration", self.check_configuration()),
            CheckResult::from_result("list access", self.check_list()),
            CheckResult::from_result("canary round trip", self.check_canary()),
            CheckResult::from_result("encryption key", self.check_key()),
            CheckResult::from_result("live data", self.check_live_data()),
        ];
        SelfTestReport { checks }
    }

    fn check_configuration(&self) -> BackupResult<String> {
        let mut copy = self.config.clone();
        let warnings = copy.normalize_and_validate()?;
        let mut message = format!(
            "{} (instance {}, region {}, keep {})",
            self.config.s3.location(),
            self.config.instance_id,
            self.config.region,
            self.config.retention.keep
        );
        if !warnings.is_empty() {
            message.push_str(&format!("; {}", warnings.join("; ")));
        }
        Ok(message)
    }

    fn check_list(&self) -> BackupResult<String> {
        let entries = list_archives(self.store, &self.config.s3.prefix)?;
        Ok(format!("{} archive(s) found", entries.len()))
    }

    fn check_canary(&self) -> BackupResult<String> {
        let key = format!(
            "{}/.selftest-{}",
            self.config.s3.prefix.trim_end_matches('/'),
            Uuid::new_v4()
        );
        let request = PutRequest {
            server_side: self.config.encryption_policy().server_side(),
            ..Default::default()
        };

        self.store.put(&key, &mut Cursor::new(CANARY_BODY), &request)?;
        let mut body = Vec::new();
        let fetched = self.store.get(&key, &mut body);
        let deleted = self.store.delete(&key);
        fetched?;
        deleted?;

        if body != CANARY_BODY {
            return Err(BackupError::Download(format!(
                "{}: canary content mismatch",
                key
            )));
        }
        debug!(key = %key, "canary object round trip ok");
        Ok(match request.server_side {
            Some(sse) => format!("upload, download and delete ok (server-side key {})", sse.key_id),
            None => "upload, download and delete ok".to_string(),
        })
    }

    fn check_key(&self) -> BackupResult<String> {
        match self.config.encryption_policy() {
            EncryptionPolicy::None => Ok("encryption disabled".to_string()),
            EncryptionPolicy::ManagedKey { key_id } => {
                Ok(format!("managed key {} (exercised by the canary upload)", key_id))
            }
            EncryptionPolicy::ClientKey { key_ref } => {
                let passphrase = self.keys.resolve(&key_ref)?;
                let params = self.kdf.with_fresh_salt();

                let mut sealed = Vec::new();
                encrypt_stream(&mut Cursor::new(CANARY_BODY), &mut sealed, &passphrase, &params, 64)?;
                let mut opened = Vec::new();
                decrypt_stream(&mut Cursor::new(sealed), &mut opened, &passphrase)?;
                if opened != CANARY_BODY {
                    return Err(BackupError::Encryption("key round trip mismatch".into()));
                }
                Ok(format!("client key from {} encrypts and decrypts", key_ref))
            }
        }
    }

    fn check_live_data(&self) -> BackupResult<String> {
        let live = self.config.live_data()?;
        if live.config_dir.is_dir() {
            Ok(format!("{} present", live.config_dir.display()))
        } else {
            Err(BackupError::Io(format!(
                "{} does not exist; nothing to back up",
                live.config_dir.display()
            )))
        }
    }
}
