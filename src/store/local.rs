//! A local directory acting as a bucket
//!
//! Keys map to relative paths under the root. Upload metadata is kept in a
//! JSON sidecar under `.meta/` so listings only ever see archive objects.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;
use walkdir::WalkDir;

use super::{ObjectStore, PutRequest, RemoteObject};
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::write_json_atomic;

const META_DIR: &str = ".meta";

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: &Path) -> BackupResult<Self> {
        fs::create_dir_all(root).map_err(|e| {
            BackupError::Config(format!(
                "Cannot create local store {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> BackupResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && relative
                .components()
                .next()
                .map(|c| c.as_os_str() != META_DIR)
                .unwrap_or(false);
        if !valid {
            return Err(BackupError::Validation(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{}.json", key))
    }
}

impl ObjectStore for LocalStore {
    fn put(&self, key: &str, data: &mut dyn Read, request: &PutRequest) -> BackupResult<()> {
        let path = self.object_path(key)?;
        if request.server_side.is_some() {
            warn!(key, "managed-key encryption has no effect on the local backend");
        }

        let upload_err = |e: io::Error| BackupError::Upload(format!("{}: {}", key, e));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(upload_err)?;
        }

        let temp_path = path.with_extension("part");
        let result = (|| {
            let mut writer = BufWriter::new(File::create(&temp_path).map_err(upload_err)?);
            io::copy(data, &mut writer).map_err(upload_err)?;
            writer.flush().map_err(upload_err)?;
            drop(writer);
            fs::rename(&temp_path, &path).map_err(upload_err)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
            return result;
        }

        if !request.metadata.is_empty() {
            let meta_path = self.meta_path(key);
            if let Some(parent) = meta_path.parent() {
                fs::create_dir_all(parent).map_err(upload_err)?;
            }
            write_json_atomic(&meta_path, &request.metadata)
                .map_err(|e| BackupError::Upload(format!("{}: {}", key, e)))?;
        }
        Ok(())
    }

    fn get(&self, key: &str, writer: &mut (dyn Write + Send)) -> BackupResult<u64> {
        let path = self.object_path(key)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::object_not_found(key))
            }
            Err(e) => return Err(BackupError::Download(format!("{}: {}", key, e))),
        };
        io::copy(&mut file, writer).map_err(|e| BackupError::Download(format!("{}: {}", key, e)))
    }

    fn list(&self, prefix: &str) -> BackupResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let meta_root = self.root.join(META_DIR);

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| {
                BackupError::Download(format!("Failed to list {}: {}", self.root.display(), e))
            })?;
            if entry.path().starts_with(&meta_root) || !entry.file_type().is_file() {
                continue;
            }
            let key = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if !key.starts_with(prefix) || key.ends_with(".part") {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| BackupError::Download(format!("{}: {}", key, e)))?;
            let last_modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            objects.push(RemoteObject {
                key,
                last_modified,
                size: metadata.len(),
            });
        }
        Ok(objects)
    }

    fn delete(&self, key: &str) -> BackupResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BackupError::Delete(format!("{}: {}", key, e))),
        }
        let _ = fs::remove_file(self.meta_path(key));
        Ok(())
    }

    fn exists(&self, key: &str) -> BackupResult<bool> {
        Ok(self.object_path(key)?.is_file())
    }

    fn location(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerSideEncryption;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Upload metadata recorded next to an object, if any
    fn read_object_metadata(store: &LocalStore, key: &str) -> Option<BTreeMap<String, String>> {
        let path = store.meta_path(key);
        path.exists()
            .then(|| crate::storage::file_io::read_json_required(&path).unwrap())
    }

    fn put_bytes(store: &LocalStore, key: &str, bytes: &[u8]) {
        store
            .put(key, &mut &bytes[..], &PutRequest::default())
            .unwrap();
    }

    #[test]
    fn test_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).unwrap();

        put_bytes(&store, "pfx/a.tar.gz", b"hello");
        assert!(store.exists("pfx/a.tar.gz").unwrap());

        let mut out = Vec::new();
        assert_eq!(store.get("pfx/a.tar.gz", &mut out).unwrap(), 5);
        assert_eq!(out, b"hello");

        store.delete("pfx/a.tar.gz").unwrap();
        assert!(!store.exists("pfx/a.tar.gz").unwrap());
        // deleting again is fine
        store.delete("pfx/a.tar.gz").unwrap();
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).unwrap();
        let err = store.get("pfx/missing", &mut Vec::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_filters_prefix_and_sidecars() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).unwrap();

        let mut request = PutRequest::default();
        request
            .metadata
            .insert("instance-id".into(), "i-1".into());
        request.server_side = Some(ServerSideEncryption {
            key_id: "alias/k".into(),
        });
        store
            .put("pfx/a.tar.gz", &mut &b"aaa"[..], &request)
            .unwrap();
        put_bytes(&store, "other/b.tar.gz", b"b");

        let listed = store.list("pfx/").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "pfx/a.tar.gz");
        assert_eq!(listed[0].size, 3);

        let meta = read_object_metadata(&store, "pfx/a.tar.gz").unwrap();
        assert_eq!(meta.get("instance-id").map(String::as_str), Some("i-1"));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).unwrap();
        assert!(store.exists("../outside").is_err());
        assert!(store.exists("/abs").is_err());
        assert!(store.exists(".meta/x").is_err());
    }
}
