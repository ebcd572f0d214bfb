//! Local metadata records
//!
//! One JSON file per uploaded archive, named after it. Records are an audit
//! trail: they are never deleted automatically, not even when retention
//! removes the archive they describe.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::EncryptionMethod;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// What was uploaded, where, and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub instance_id: String,
    pub region: String,
    #[serde(alias = "size")]
    pub size_bytes: u64,
    #[serde(alias = "s3Location")]
    pub remote_location: String,
    pub encrypted: bool,
    /// Older records write `null` when encryption was off
    #[serde(default, deserialize_with = "method_or_none")]
    pub encryption_method: EncryptionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_alias: Option<String>,
}

fn method_or_none<'de, D>(deserializer: D) -> Result<EncryptionMethod, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<EncryptionMethod>::deserialize(deserializer)?.unwrap_or_default())
}

/// Directory of metadata records
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Write (or overwrite) the record for `metadata.name`
    pub fn record(&self, metadata: &BackupMetadata) -> BackupResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create metadata directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let path = self.record_path(&metadata.name);
        write_json_atomic(&path, metadata)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> BackupResult<BackupMetadata> {
        let path = self.record_path(name);
        if !path.exists() {
            return Err(BackupError::backup_not_found(name));
        }
        read_json_required(&path)
    }

    /// All readable records, newest first
    pub fn list(&self) -> BackupResult<Vec<BackupMetadata>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .map_err(|e| BackupError::Io(format!("Failed to read metadata directory: {}", e)))?
        {
            let entry = entry
                .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Ok(record) = read_json_required::<BackupMetadata, _>(&path) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.name.cmp(&a.name)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str) -> BackupMetadata {
        BackupMetadata {
            name: name.into(),
            timestamp: Utc::now(),
            instance_id: "i-1".into(),
            region: "us-west-2".into(),
            size_bytes: 42,
            remote_location: format!("s3://bucket/pfx/{}.tar.gz", name),
            encrypted: false,
            encryption_method: EncryptionMethod::None,
            kms_key_alias: None,
        }
    }

    #[test]
    fn test_record_and_load() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("backups"));
        let meta = sample("openclaw-aws-backup-2025-01-01T00-00-00");

        let path = store.record(&meta).unwrap();
        assert!(path.ends_with("openclaw-aws-backup-2025-01-01T00-00-00.json"));
        assert_eq!(store.load(&meta.name).unwrap(), meta);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_record() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        assert!(store.load("nope").unwrap_err().is_not_found());
        assert!(MetadataStore::new(temp.path().join("absent"))
            .list()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_reads_legacy_record() {
        let json = r#"{
            "name": "openclaw-aws-backup-2025-11-27T14-30-22",
            "timestamp": "2025-11-27T14:30:25.120Z",
            "instanceId": "i-0abc",
            "region": "us-west-2",
            "size": 1234,
            "s3Location": "s3://b/p/openclaw-aws-backup-2025-11-27T14-30-22.tar.gz",
            "encrypted": true,
            "encryptionMethod": "kms",
            "kmsKeyAlias": "alias/x"
        }"#;
        let meta: BackupMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.size_bytes, 1234);
        assert_eq!(meta.encryption_method, EncryptionMethod::ManagedKey);
    }

    #[test]
    fn test_reads_record_without_encryption_method() {
        let json = r#"{
            "name": "openclaw-aws-backup-2025-11-27T14-30-22",
            "timestamp": "2025-11-27T14:30:25.120Z",
            "instanceId": "i-0abc",
            "region": "us-west-2",
            "size": 99,
            "s3Location": "s3://b/p/openclaw-aws-backup-2025-11-27T14-30-22.tar.gz",
            "encrypted": false,
            "encryptionMethod": null
        }"#;
        let meta: BackupMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.encryption_method, EncryptionMethod::None);
        assert_eq!(meta.size_bytes, 99);

        let without_field = r#"{"name":"n","timestamp":"2025-11-27T14:30:25Z","instanceId":"i",
            "region":"r","sizeBytes":1,"remoteLocation":"s3://b/k","encrypted":false}"#;
        let meta: BackupMetadata = serde_json::from_str(without_field).unwrap();
        assert_eq!(meta.encryption_method, EncryptionMethod::None);
    }

    #[test]
    fn test_list_includes_records_with_null_method() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("backups");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("openclaw-aws-backup-2025-11-27T14-30-22.json"),
            r#"{"name":"openclaw-aws-backup-2025-11-27T14-30-22","timestamp":"2025-11-27T14:30:25Z",
               "instanceId":"i-0abc","region":"us-west-2","size":1,"s3Location":"s3://b/k",
               "encrypted":false,"encryptionMethod":null}"#,
        )
        .unwrap();

        let records = MetadataStore::new(&dir).list().unwrap();
        assert_eq!(records.len(), 1);
    }
}
