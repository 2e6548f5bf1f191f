//! Configuration for storage backends, sync cadence and backup policy.
//!
//! All values are plain data the engines receive at construction. Environment
//! lookup happens only in `from_env` helpers called at the application
//! boundary; nothing in the core reads the environment on its own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use talentdb_retry::RetryPolicy;

use crate::{Result, TalentError};

/// Enumeration of supported object store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    /// Local filesystem directories acting as containers
    Local,
    /// In-process store; nothing survives the process
    Memory,
    /// Amazon S3, one bucket per container
    S3,
}

/// Object store settings shared by the database and backup containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The storage backend to use
    pub backend: StoreBackend,
    /// AWS region for S3 operations (optional, defaults to environment)
    pub s3_region: Option<String>,
    /// Base directory for local storage (containers become subdirectories)
    pub local_base_path: Option<PathBuf>,
    /// Per-operation timeout applied to remote calls
    pub operation_timeout: Duration,
}

impl StoreConfig {
    /// Local filesystem backend rooted at the default base directory
    pub fn default_local() -> Self {
        StoreConfig {
            backend: StoreBackend::Local,
            s3_region: None,
            local_base_path: None,
            operation_timeout: Duration::from_secs(30),
        }
    }

    /// In-process backend, mainly for tests and throwaway runs
    pub fn memory() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            ..Self::default_local()
        }
    }

    /// S3 backend; container names are used directly as bucket names
    pub fn s3() -> Self {
        StoreConfig {
            backend: StoreBackend::S3,
            ..Self::default_local()
        }
    }

    pub fn from_env() -> Self {
        let backend = match env_or("TALENTDB_STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "s3" => StoreBackend::S3,
            "memory" => StoreBackend::Memory,
            _ => StoreBackend::Local,
        };
        StoreConfig {
            backend,
            s3_region: std::env::var("AWS_REGION").ok(),
            local_base_path: std::env::var("TALENTDB_STORAGE_PATH").ok().map(PathBuf::from),
            operation_timeout: Duration::from_secs(env_u64("TALENTDB_OPERATION_TIMEOUT_SECS", 30)),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

/// Sync engine settings: where the local cache file lives and how eagerly it
/// reconciles with the canonical blob.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path of the local cache file
    pub local_db_path: PathBuf,
    /// Name of the canonical database blob inside its container
    pub db_blob_name: String,
    /// Local file younger than this skips non-forced downloads
    pub freshness_window: Duration,
    /// Cadence of the background upload loop
    pub sync_interval: Duration,
    /// Whether construction starts the background upload loop
    pub auto_sync_enabled: bool,
    /// Retry policy shared by download and upload
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(local_db_path: impl Into<PathBuf>, db_blob_name: impl Into<String>) -> Self {
        SyncConfig {
            local_db_path: local_db_path.into(),
            db_blob_name: db_blob_name.into(),
            freshness_window: Duration::from_secs(300),
            sync_interval: Duration::from_secs(300),
            auto_sync_enabled: true,
            retry: RetryPolicy::transfer_default(),
        }
    }
}

/// Backup engine settings.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Fixed-name artifact always holding the most recent raw database image
    pub latest_alias: String,
    /// Backups older than this many days are swept by retention cleanup
    pub retention_days: i64,
    /// Whether construction starts the hourly scheduler
    pub auto_backup_enabled: bool,
    /// Cadence of the scheduler loop
    pub schedule_interval: Duration,
    /// Re-arm delay after a failed scheduler cycle
    pub schedule_error_interval: Duration,
    /// Scheduler creates an automatic backup when the newest one is older than this
    pub max_backup_age_hours: i64,
    /// Write-counter threshold that fires an automatic backup
    pub write_trigger_threshold: u32,
    /// Retry policy for backup artifact uploads
    pub retry: RetryPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            latest_alias: "latest.db".to_string(),
            retention_days: 30,
            auto_backup_enabled: true,
            schedule_interval: Duration::from_secs(3600),
            schedule_error_interval: Duration::from_secs(300),
            max_backup_age_hours: 24,
            write_trigger_threshold: 5,
            retry: RetryPolicy::transfer_default(),
        }
    }
}

/// Top-level configuration handed to [`crate::open`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Container holding the canonical database blob
    pub db_container: String,
    /// Container holding backup artifacts; must differ from `db_container`
    pub backup_container: String,
    pub sync: SyncConfig,
    pub backup: BackupConfig,
    /// Cap applied to search results
    pub max_search_results: usize,
}

impl AppConfig {
    /// Build the configuration from environment variables, falling back to
    /// the documented defaults. Called at the application boundary only.
    pub fn from_env() -> Self {
        let local_db_path = std::env::var("TALENTDB_LOCAL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("talentdb").join("candidates.db"));

        let mut sync = SyncConfig::new(local_db_path, env_or("TALENTDB_DB_BLOB_NAME", "candidates.db"));
        sync.freshness_window = Duration::from_secs(env_u64("TALENTDB_FRESHNESS_WINDOW_SECS", 300));
        sync.sync_interval = Duration::from_secs(env_u64("TALENTDB_SYNC_INTERVAL_SECS", 300));
        sync.auto_sync_enabled = env_bool("TALENTDB_AUTO_SYNC_ENABLED", true);

        let mut backup = BackupConfig::default();
        backup.retention_days = env_u64("TALENTDB_BACKUP_RETENTION_DAYS", 30) as i64;
        backup.auto_backup_enabled = env_bool("TALENTDB_AUTO_BACKUP_ENABLED", true);
        backup.write_trigger_threshold = env_u64("TALENTDB_BACKUP_WRITE_THRESHOLD", 5) as u32;

        AppConfig {
            store: StoreConfig::from_env(),
            db_container: env_or("TALENTDB_DB_CONTAINER", "appdata"),
            backup_container: env_or("TALENTDB_BACKUP_CONTAINER", "appdata-backups"),
            sync,
            backup,
            max_search_results: env_u64("TALENTDB_MAX_SEARCH_RESULTS", 100) as usize,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.db_container.is_empty() {
            return Err(TalentError::validation("database container name cannot be empty"));
        }
        if self.backup_container.is_empty() {
            return Err(TalentError::validation("backup container name cannot be empty"));
        }
        if self.db_container == self.backup_container {
            return Err(TalentError::validation(
                "backups must live in a container distinct from the canonical database blob",
            ));
        }
        if self.sync.db_blob_name.is_empty() {
            return Err(TalentError::validation("database blob name cannot be empty"));
        }
        if self.backup.write_trigger_threshold == 0 {
            return Err(TalentError::validation("write trigger threshold must be at least 1"));
        }
        Ok(())
    }

    /// Configuration summary without sensitive data, for logs and the CLI.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "app_name": crate::APP_NAME,
            "app_version": crate::APP_VERSION,
            "backend": self.store.backend,
            "db_container": self.db_container,
            "db_blob_name": self.sync.db_blob_name,
            "local_db_path": self.sync.local_db_path.display().to_string(),
            "backup_container": self.backup_container,
            "auto_sync_enabled": self.sync.auto_sync_enabled,
            "sync_interval_seconds": self.sync.sync_interval.as_secs(),
            "freshness_window_seconds": self.sync.freshness_window.as_secs(),
            "auto_backup_enabled": self.backup.auto_backup_enabled,
            "backup_retention_days": self.backup.retention_days,
            "backup_write_threshold": self.backup.write_trigger_threshold,
            "max_search_results": self.max_search_results,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            store: StoreConfig::default_local(),
            db_container: "appdata".to_string(),
            backup_container: "appdata-backups".to_string(),
            sync: SyncConfig::new(
                std::env::temp_dir().join("talentdb").join("candidates.db"),
                "candidates.db",
            ),
            backup: BackupConfig::default(),
            max_search_results: 100,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}
