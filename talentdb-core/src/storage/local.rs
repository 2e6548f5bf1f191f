/*!
Local filesystem object store adapter.
*/

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{ObjectInfo, ObjectStore};
use crate::{Result, TalentError};

/// Filesystem-backed container: one directory, one file per object.
///
/// Parent directories are created on demand. Useful for development and
/// single-host deployments where "remote" durability is a mounted volume.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalDirStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TalentError::NotFound(format!("object '{key}' not found"))
            } else {
                TalentError::storage(format!("failed to read {}: {e}", path.display()))
            }
        })
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    TalentError::storage(format!(
                        "failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        fs::write(&path, data)
            .map_err(|e| TalentError::storage(format!("failed to write {}: {e}", path.display())))
    }

    fn exists(&self, key: &str) -> bool {
        self.object_path(key).exists()
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                TalentError::storage(format!("failed to delete {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            TalentError::storage(format!("failed to list {}: {e}", self.root.display()))
        })?;

        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| TalentError::storage(format!("failed to read directory entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(prefix) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| TalentError::storage(format!("failed to stat {name}: {e}")))?;
            if !metadata.is_file() {
                continue;
            }
            objects.push(ObjectInfo {
                key: name,
                size: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(temp_dir.path().join("container"));

        let data = b"canonical database image";
        store.put("candidates.db", data).unwrap();
        assert!(store.exists("candidates.db"));
        assert_eq!(store.get("candidates.db").unwrap(), data);

        store.delete("candidates.db").unwrap();
        assert!(!store.exists("candidates.db"));
        // deleting again is a no-op
        store.delete("candidates.db").unwrap();
    }

    #[test]
    fn missing_object_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(temp_dir.path());

        let err = store.get("nope.db").unwrap_err();
        assert!(matches!(err, TalentError::NotFound(_)));
    }

    #[test]
    fn list_filters_by_prefix_and_reports_size() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(temp_dir.path());

        store.put("backup_manual_20250101_120000.db", b"aaaa").unwrap();
        store.put("backup_auto_20250102_120000.gz", b"bb").unwrap();
        store.put("latest.db", b"cccc").unwrap();

        let backups = store.list("backup_").unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(|o| o.key.starts_with("backup_")));
        assert!(backups.iter().all(|o| o.last_modified.is_some()));

        let all = store.list("").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn list_on_missing_container_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(temp_dir.path().join("never-created"));
        assert!(store.list("").unwrap().is_empty());
    }
}
