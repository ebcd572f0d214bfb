//! Object store client
//!
//! A minimal contract for named blobs in a namespace. Every archive the tool
//! creates or restores passes through one of these implementations.

pub mod aws;
pub mod local;

use std::collections::BTreeMap;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};

pub use aws::S3Store;
pub use local::LocalStore;

use crate::config::{BackupConfig, StoreBackend};
use crate::error::{BackupError, BackupResult};

/// One object returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Server-side encryption parameters for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSideEncryption {
    pub key_id: String,
}

/// Everything attached to an upload besides the bytes
#[derive(Debug, Clone, Default)]
pub struct PutRequest {
    /// Informational only; never read back for restore decisions
    pub metadata: BTreeMap<String, String>,
    pub server_side: Option<ServerSideEncryption>,
}

/// Put/get/list/delete of named blobs
pub trait ObjectStore {
    /// Store `data` under `key`, replacing any existing object
    fn put(&self, key: &str, data: &mut dyn Read, request: &PutRequest) -> BackupResult<()>;

    /// Write the object's bytes to `writer`, returning the byte count
    fn get(&self, key: &str, writer: &mut (dyn Write + Send)) -> BackupResult<u64>;

    /// All objects whose key starts with `prefix`
    fn list(&self, prefix: &str) -> BackupResult<Vec<RemoteObject>>;

    fn delete(&self, key: &str) -> BackupResult<()>;

    fn exists(&self, key: &str) -> BackupResult<bool>;

    /// Human-readable location of a key, e.g. `s3://bucket/key`
    fn location(&self, key: &str) -> String;
}

/// Open the backend named in the configuration
pub fn open_store(config: &BackupConfig) -> BackupResult<Box<dyn ObjectStore>> {
    match config.s3.backend {
        StoreBackend::S3 => Ok(Box::new(S3Store::connect(
            &config.s3.bucket,
            &config.region,
            config.s3.endpoint.as_deref(),
        )?)),
        StoreBackend::Local => {
            let root = config.s3.local_path.as_ref().ok_or_else(|| {
                BackupError::Config("s3.localPath is required for the local backend".into())
            })?;
            Ok(Box::new(LocalStore::open(root)?))
        }
    }
}
