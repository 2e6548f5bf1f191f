/*!
In-memory object store adapter.

Backs unit and integration tests without touching the filesystem or the
network, and doubles as a throwaway backend for ephemeral runs. Two injection
knobs (put latency, forced put failures) let tests exercise the upload lock
and the retry paths.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{ObjectInfo, ObjectStore};
use crate::{Result, TalentError};

struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// HashMap-backed container.
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    put_latency: Mutex<Duration>,
    failing_puts: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            put_latency: Mutex::new(Duration::ZERO),
            failing_puts: AtomicU32::new(0),
        }
    }

    /// Every subsequent `put` sleeps this long before completing. Lets tests
    /// hold an upload in flight while probing the mutual-exclusion gate.
    pub fn set_put_latency(&self, latency: Duration) {
        *self.put_latency.lock().unwrap() = latency;
    }

    /// Fail the next `n` puts with a transient storage error, then recover.
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| TalentError::NotFound(format!("object '{key}' not found")))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let latency = *self.put_latency.lock().unwrap();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TalentError::storage(format!(
                "simulated put failure for '{key}': request timed out"
            )));
        }
        let mut objects = self.objects.lock().unwrap();
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let objects = self.objects.lock().unwrap();
        let mut infos: Vec<ObjectInfo> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_delete() {
        let store = MemoryStore::new();
        store.put("a.db", b"one").unwrap();
        assert!(store.exists("a.db"));
        assert_eq!(store.get("a.db").unwrap(), b"one");

        store.delete("a.db").unwrap();
        assert!(!store.exists("a.db"));
        assert!(matches!(store.get("a.db"), Err(TalentError::NotFound(_))));
    }

    #[test]
    fn overwrite_replaces_content() {
        let store = MemoryStore::new();
        store.put("a.db", b"one").unwrap();
        store.put("a.db", b"two").unwrap();
        assert_eq!(store.get("a.db").unwrap(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn forced_failures_are_transient_and_finite() {
        let store = MemoryStore::new();
        store.fail_next_puts(2);

        let first = store.put("a.db", b"x").unwrap_err();
        assert!(first.is_transient());
        assert!(store.put("a.db", b"x").is_err());
        assert!(store.put("a.db", b"x").is_ok());
    }

    #[test]
    fn list_respects_prefix() {
        let store = MemoryStore::new();
        store.put("backup_auto_20250101_000000.gz", b"1").unwrap();
        store.put("latest.db", b"2").unwrap();

        let backups = store.list("backup_").unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].key, "backup_auto_20250101_000000.gz");
        assert_eq!(backups[0].size, 1);
    }
}
