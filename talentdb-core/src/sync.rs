/*!
Sync engine: owns the local cache file and every transition between "remote is
authoritative" and "local is authoritative".

The canonical database lives as one blob in the object store. Each instance
downloads it to a local SQLite file, serves all queries from that file, and
pushes whole-file replacements back. Uploads are serialized by a mutex plus an
in-flight gate; downloads are not locked against uploads from *other*
instances — a full-file-replace strategy accepts that narrow race and relies
on the freshness window to keep download traffic low.
*/

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use talentdb_retry::{permanent_error, transient_error};

use crate::config::SyncConfig;
use crate::schema;
use crate::storage::ObjectStore;
use crate::tasks::Ticker;
use crate::{Result, TalentError};

/// Direction tag recorded in sync_log rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncDirection {
    Upload,
    Download,
}

impl SyncDirection {
    fn as_str(self) -> &'static str {
        match self {
            SyncDirection::Upload => "upload",
            SyncDirection::Download => "download",
        }
    }
}

/// Point-in-time view of the engine's state.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub local_db_exists: bool,
    pub local_db_size: u64,
    pub force_download_flagged: bool,
}

/// Maintains the single local replica of the canonical remote database file.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
    upload_lock: Mutex<()>,
    is_syncing: AtomicBool,
    force_download: AtomicBool,
    last_sync_time: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    /// Create the engine and reconcile with the remote immediately.
    ///
    /// A missing remote blob bootstraps an empty schema locally and claims the
    /// canonical slot (first writer wins). A failed download with no local
    /// file falls back to the same bootstrap, so construction only errors when
    /// even local schema creation is impossible.
    pub fn new(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Result<Arc<Self>> {
        let engine = Arc::new(Self {
            store,
            config,
            upload_lock: Mutex::new(()),
            is_syncing: AtomicBool::new(false),
            force_download: AtomicBool::new(false),
            last_sync_time: Mutex::new(None),
        });

        // login/startup always reconciles with remote
        engine.download(true);
        if !engine.local_db_exists() {
            return Err(TalentError::storage(
                "no usable local database after initial sync",
            ));
        }
        Ok(engine)
    }

    /// Pull the canonical blob over the local file.
    ///
    /// Without `force`, a local file younger than the freshness window
    /// short-circuits the network call. Failures are logged and surfaced as
    /// `false`; they never leave the system without a usable local file when
    /// one can be synthesized.
    pub fn download(&self, force: bool) -> bool {
        match self.try_download(force) {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to download database: {err}");
                false
            }
        }
    }

    fn try_download(&self, force: bool) -> Result<()> {
        if !force {
            if let Some(age) = self.local_file_age() {
                if age < self.config.freshness_window {
                    debug!(
                        age_secs = age.as_secs(),
                        "local database is fresh, skipping download"
                    );
                    return Ok(());
                }
            }
        }

        let blob_name = self.config.db_blob_name.clone();
        let fetched = self.config.retry.run("db_download", |_attempt| {
            match self.store.get(&blob_name) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(TalentError::NotFound(_)) => Ok(None),
                Err(err) if err.is_transient() => Err(transient_error!("db_download", err)),
                Err(err) => Err(permanent_error!("db_download", err)),
            }
        });

        match fetched {
            Ok(Some(bytes)) => {
                self.replace_local_file(&bytes)?;
                self.set_last_sync();
                // no audit row here: a fresh download must leave the local
                // file byte-identical to the canonical blob
                info!(
                    path = %self.config.local_db_path.display(),
                    size = bytes.len(),
                    "Database downloaded successfully"
                );
                Ok(())
            }
            Ok(None) => {
                info!("Database blob doesn't exist, creating new database");
                self.create_initial_database()
            }
            Err(err) => {
                self.log_sync(SyncDirection::Download, false, &err.to_string());
                if !self.local_db_exists() {
                    warn!("download failed with no local copy, bootstrapping empty schema: {err}");
                    self.create_initial_database()?;
                }
                Err(TalentError::storage(format!("download failed: {err}")))
            }
        }
    }

    /// Push the local file over the canonical blob.
    ///
    /// A concurrent in-flight upload causes a non-forced request to no-op;
    /// `force` waits its turn on the mutex instead. Transient failures retry
    /// under the shared policy. Returns whether an upload completed.
    pub fn upload(&self, force: bool) -> bool {
        if self.is_syncing.load(Ordering::SeqCst) && !force {
            debug!("Sync already in progress, skipping upload");
            return false;
        }

        let _guard = match self.upload_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.is_syncing.store(true, Ordering::SeqCst);
        let outcome = self.try_upload();
        self.is_syncing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(size) => {
                self.log_sync(
                    SyncDirection::Upload,
                    true,
                    &format!("uploaded {size} bytes"),
                );
                info!(size, "Database uploaded successfully to object store");
                true
            }
            Err(err) => {
                error!("Failed to upload database: {err}");
                self.log_sync(SyncDirection::Upload, false, &err.to_string());
                false
            }
        }
    }

    fn try_upload(&self) -> Result<u64> {
        let path = &self.config.local_db_path;
        if !path.exists() {
            return Err(TalentError::storage(format!(
                "local database not found: {}",
                path.display()
            )));
        }
        let bytes = fs::read(path)?;

        let blob_name = self.config.db_blob_name.clone();
        self.config
            .retry
            .run("db_upload", |_attempt| {
                match self.store.put(&blob_name, &bytes) {
                    Ok(()) => Ok(()),
                    Err(err) if err.is_transient() => Err(transient_error!("db_upload", err)),
                    Err(err) => Err(permanent_error!("db_upload", err)),
                }
            })
            .map_err(|err| TalentError::storage(format!("upload failed: {err}")))?;

        self.set_last_sync();
        Ok(bytes.len() as u64)
    }

    /// The sole gateway for obtaining a handle to the local file.
    ///
    /// A pending force-download flag, or a missing local file, triggers a
    /// forced download first. The returned connection always sees the
    /// required schema.
    pub fn connection(&self) -> Result<Connection> {
        if self.force_download.load(Ordering::SeqCst) || !self.local_db_exists() {
            self.download(true);
            self.force_download.store(false, Ordering::SeqCst);
        }

        let conn = Connection::open(&self.config.local_db_path)?;
        if !schema::has_required_tables(&conn)? {
            schema::init_schema(&conn)?;
        }
        Ok(conn)
    }

    /// Discard the local file and redownload unconditionally: the explicit
    /// "trust remote, abandon local" operation.
    pub fn force_refresh(&self) -> bool {
        info!("Force refresh: discarding local database and re-downloading");
        if let Err(err) = self.remove_local_file() {
            error!("Failed to force refresh: {err}");
            return false;
        }
        self.download(true)
    }

    /// Flag the next `connection()` call to reconcile with remote first.
    pub fn request_refresh(&self) {
        self.force_download.store(true, Ordering::SeqCst);
    }

    /// Current engine state.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            last_sync_time: *self.last_sync_time.lock().unwrap(),
            is_syncing: self.is_syncing.load(Ordering::SeqCst),
            local_db_exists: self.local_db_exists(),
            local_db_size: self.local_db_size(),
            force_download_flagged: self.force_download.load(Ordering::SeqCst),
        }
    }

    /// Start the periodic upload loop. The returned ticker stops the loop
    /// when dropped.
    pub fn start_auto_sync(self: &Arc<Self>) -> Ticker {
        let engine = Arc::clone(self);
        let interval = self.config.sync_interval;
        Ticker::spawn("auto-sync", interval, interval, move || {
            if engine.is_syncing.load(Ordering::SeqCst) {
                debug!("upload in flight, auto-sync tick skipped");
                return Ok(());
            }
            let uploaded = engine.upload(false);
            debug!(uploaded, "auto-sync tick");
            Ok(())
        })
    }

    /// Final upload, then remove the local cache file. Shutdown path.
    pub fn cleanup(&self) -> bool {
        let uploaded = self.upload(true);
        match self.remove_local_file() {
            Ok(()) => {
                info!("Local database cleaned up");
                uploaded
            }
            Err(err) => {
                error!("Failed to cleanup local database: {err}");
                false
            }
        }
    }

    pub fn local_db_path(&self) -> &Path {
        &self.config.local_db_path
    }

    pub fn local_db_exists(&self) -> bool {
        self.config.local_db_path.exists()
    }

    fn local_db_size(&self) -> u64 {
        fs::metadata(&self.config.local_db_path)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn local_file_age(&self) -> Option<Duration> {
        fs::metadata(&self.config.local_db_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
    }

    /// Write the downloaded image to a temp file in the destination directory
    /// and atomically rename it into place, so readers never observe a
    /// partially written file.
    fn replace_local_file(&self, bytes: &[u8]) -> Result<()> {
        let path = &self.config.local_db_path;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(bytes)?;
        temp.persist(path).map_err(|e| {
            TalentError::storage(format!("failed to replace local database: {e}"))
        })?;
        Ok(())
    }

    /// Create a fresh schema-bearing local file and claim the canonical slot
    /// by uploading it.
    fn create_initial_database(&self) -> Result<()> {
        let path = &self.config.local_db_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        drop(conn);

        if self.upload(true) {
            info!("Initial database created and uploaded");
        } else {
            warn!("Initial database created locally; canonical upload pending");
        }
        Ok(())
    }

    fn remove_local_file(&self) -> Result<()> {
        match fs::remove_file(&self.config.local_db_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn set_last_sync(&self) {
        *self.last_sync_time.lock().unwrap() = Some(Utc::now());
    }

    /// Best-effort audit row; a failure to log never fails the sync itself.
    fn log_sync(&self, direction: SyncDirection, ok: bool, message: &str) {
        if !self.local_db_exists() {
            return;
        }
        let status = if ok { "success" } else { "failed" };
        let result = Connection::open(&self.config.local_db_path).and_then(|conn| {
            conn.execute(
                "INSERT INTO sync_log (sync_time, sync_type, status, message) VALUES (?1, ?2, ?3, ?4)",
                params![Utc::now(), direction.as_str(), status, message],
            )
        });
        if let Err(err) = result {
            warn!("failed to record sync log entry: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn engine_with_store(
        dir: &TempDir,
        store: Arc<MemoryStore>,
    ) -> Arc<SyncEngine> {
        let mut config = SyncConfig::new(dir.path().join("candidates.db"), "candidates.db");
        // keep retries instant under test
        config.retry = talentdb_retry::RetryPolicy::new(
            3,
            talentdb_retry::BackoffStrategy::Fixed {
                delay: Duration::ZERO,
            },
        );
        SyncEngine::new(store, config).unwrap()
    }

    #[test]
    fn empty_remote_bootstraps_and_claims_canonical_slot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, Arc::clone(&store));

        assert!(engine.local_db_exists());
        assert!(store.exists("candidates.db"));

        let conn = engine.connection().unwrap();
        assert!(schema::has_required_tables(&conn).unwrap());
    }

    #[test]
    fn fresh_local_file_short_circuits_download() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, Arc::clone(&store));

        let before = fs::read(engine.local_db_path()).unwrap();
        // clobber the remote; a non-forced download must not pick it up while
        // the local file is inside the freshness window
        store.put("candidates.db", b"not a database").unwrap();

        assert!(engine.download(false));
        assert_eq!(fs::read(engine.local_db_path()).unwrap(), before);

        assert!(engine.download(true));
        assert_eq!(fs::read(engine.local_db_path()).unwrap(), b"not a database");
    }

    #[test]
    fn upload_survives_transient_failures() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, Arc::clone(&store));

        store.fail_next_puts(2);
        assert!(engine.upload(true));
    }

    #[test]
    fn upload_exhausting_retries_reports_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, Arc::clone(&store));

        store.fail_next_puts(10);
        assert!(!engine.upload(true));
        // local file untouched by the failed upload
        assert!(engine.local_db_exists());
    }

    #[test]
    fn status_reflects_flags_and_file() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, store);

        let status = engine.status();
        assert!(status.local_db_exists);
        assert!(status.local_db_size > 0);
        assert!(!status.is_syncing);
        assert!(!status.force_download_flagged);
        assert!(status.last_sync_time.is_some());

        engine.request_refresh();
        assert!(engine.status().force_download_flagged);
        engine.connection().unwrap();
        assert!(!engine.status().force_download_flagged);
    }

    #[test]
    fn cleanup_uploads_then_removes_local_file() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(&dir, Arc::clone(&store));

        assert!(engine.cleanup());
        assert!(!engine.local_db_exists());
        assert!(store.exists("candidates.db"));
    }
}
