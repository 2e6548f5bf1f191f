/*!
Object store adapters for the canonical database blob and backup artifacts.

This module defines the storage abstraction (port) and concrete implementations
(adapters). The sync and backup engines are independent of storage details,
which keeps new backends cheap to add and lets tests run fully in-process.
*/

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{StoreBackend, StoreConfig};
use crate::Result;

/// Metadata for a single stored object, as returned by [`ObjectStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage abstraction for whole-object reads and writes
///
/// Keys are flat names inside one container (a bucket, a directory, or an
/// in-memory map). All operations are blocking; callers wanting retries wrap
/// them in a `RetryPolicy`.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's full contents. Missing objects surface as
    /// [`crate::TalentError::NotFound`], which callers treat as a signal, not
    /// a failure.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store an object, overwriting any existing one under the same key.
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Check whether an object exists.
    fn exists(&self, key: &str) -> bool;

    /// Delete an object. Deleting a missing object is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Enumerate objects whose key starts with `prefix` (empty prefix lists
    /// the whole container).
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;
}

pub use local::LocalDirStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// Build a store for one container according to the backend configuration.
pub fn build_store(config: &StoreConfig, container: &str) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Local => {
            let base = config
                .local_base_path
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from("./talentdb-store"));
            Ok(Arc::new(LocalDirStore::new(base.join(container))))
        }
        #[cfg(feature = "s3")]
        StoreBackend::S3 => Ok(Arc::new(S3ObjectStore::new(
            container.to_string(),
            config.s3_region.clone(),
            config.operation_timeout,
        )?)),
        #[cfg(not(feature = "s3"))]
        StoreBackend::S3 => Err(crate::TalentError::validation(
            "this build does not include the 's3' feature",
        )),
    }
}
