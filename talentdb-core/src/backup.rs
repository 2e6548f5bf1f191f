/*!
Backup engine: point-in-time copies of the local cache file, catalogued in a
container separate from the live canonical blob.

Backups run on their own lock and cadence. Creating one forces a live sync
first, so a backup always reflects the latest writes; restoring one forces a
re-upload, so the restored state becomes canonical remotely as well.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use talentdb_retry::{permanent_error, transient_error};

use crate::artifact::{self, ArtifactOptions, EnvelopeMeta};
use crate::config::BackupConfig;
use crate::schema;
use crate::storage::{ObjectInfo, ObjectStore};
use crate::sync::SyncEngine;
use crate::tasks::Ticker;
use crate::{Result, TalentError};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// What initiated a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Manual,
    Auto,
    Scheduled,
    /// Listing fallback for artifacts whose name does not parse
    Unknown,
}

impl BackupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Auto => "auto",
            BackupKind::Scheduled => "scheduled",
            BackupKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(BackupKind::Manual),
            "auto" => Some(BackupKind::Auto),
            "scheduled" => Some(BackupKind::Scheduled),
            _ => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a backup artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    InProgress,
    Completed,
    Failed,
}

/// Descriptor of one backup artifact.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub compressed: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Aggregate view of the backup catalogue and engine counters.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub total_backups: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub latest_backup: Option<BackupInfo>,
    pub avg_backup_interval_hours: f64,
    pub backups_by_kind: BTreeMap<String, usize>,
    pub retention_days: i64,
    pub auto_backup_enabled: bool,
    pub backup_in_progress: bool,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Unhealthy,
}

/// Health verdict combining connectivity, staleness, footprint and the
/// observed failure rate.
#[derive(Debug, Clone, Serialize)]
pub struct BackupHealth {
    pub status: HealthState,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// One restorable artifact: the latest alias or a named backup.
#[derive(Debug, Clone, Serialize)]
pub struct RestorePoint {
    pub name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: String,
    pub size_bytes: u64,
}

/// Produces, catalogues, retains and restores backups.
pub struct BackupEngine {
    store: Arc<dyn ObjectStore>,
    sync: Arc<SyncEngine>,
    config: BackupConfig,
    backup_lock: Mutex<()>,
    in_progress: AtomicBool,
    last_backup_time: Mutex<Option<DateTime<Utc>>>,
    write_counter: AtomicU32,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl BackupEngine {
    pub fn new(store: Arc<dyn ObjectStore>, sync: Arc<SyncEngine>, config: BackupConfig) -> Self {
        Self {
            store,
            sync,
            config,
            backup_lock: Mutex::new(()),
            in_progress: AtomicBool::new(false),
            last_backup_time: Mutex::new(None),
            write_counter: AtomicU32::new(0),
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Create a backup of the local cache file.
    ///
    /// Serialized by the backup lock: a second call while one is running
    /// returns [`TalentError::BackupInProgress`] instead of queuing. The
    /// attempt is recorded in the backup_log table either way, and a
    /// successful run re-syncs so that log row is itself durable.
    pub fn create_backup(
        &self,
        kind: BackupKind,
        compress: bool,
        include_metadata: bool,
    ) -> Result<BackupInfo> {
        let guard = match self.backup_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(TalentError::BackupInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.in_progress.store(true, Ordering::SeqCst);
        let outcome = self.run_backup(kind, compress, include_metadata);
        self.in_progress.store(false, Ordering::SeqCst);
        drop(guard);

        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &outcome {
            Ok(info) => self.log_backup(&info.name, "success", info.size_bytes),
            Err(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.log_backup("unknown", "failed", 0);
                error!("Backup failed: {err}");
            }
        }
        // make the log row durable remotely as well
        let _ = self.sync.upload(true);
        outcome
    }

    fn run_backup(
        &self,
        kind: BackupKind,
        compress: bool,
        include_metadata: bool,
    ) -> Result<BackupInfo> {
        let timestamp = Utc::now();
        let name = backup_name(kind, timestamp, compress);
        info!(name = %name, kind = %kind, "Starting backup");

        // the backup must reflect the latest writes
        if !self.sync.upload(true) {
            warn!("pre-backup sync failed; backing up the local file as-is");
        }

        let db_path = self.sync.local_db_path();
        if !db_path.exists() {
            return Err(TalentError::storage(format!(
                "database file not found: {}",
                db_path.display()
            )));
        }
        let db_image = fs::read(db_path)?;

        let meta = include_metadata.then(|| EnvelopeMeta {
            created_at: timestamp,
            app_version: crate::APP_VERSION.to_string(),
            candidate_count: self.candidate_count().ok(),
            previous_backup_at: *self.last_backup_time.lock().unwrap(),
        });
        let options = ArtifactOptions {
            compress,
            envelope: include_metadata,
        };
        let data = artifact::encode(&db_image, options, meta)?;

        self.put_with_retry(&name, &data)?;

        // the alias always holds a plain database image, so restoring from
        // "latest" never has to unwrap anything
        if let Err(err) = self.put_with_retry(&self.config.latest_alias, &db_image) {
            warn!("failed to refresh latest backup alias: {err}");
        }

        *self.last_backup_time.lock().unwrap() = Some(timestamp);

        let mut metadata = BTreeMap::new();
        if include_metadata {
            metadata.insert("app_version".to_string(), crate::APP_VERSION.to_string());
            if let Ok(count) = self.candidate_count() {
                metadata.insert("candidate_count".to_string(), count.to_string());
            }
        }

        info!(name = %name, size = data.len(), "Backup completed successfully");
        Ok(BackupInfo {
            name,
            timestamp,
            size_bytes: data.len() as u64,
            kind,
            status: BackupStatus::Completed,
            compressed: compress,
            metadata,
        })
    }

    /// Restore the local cache file from a backup artifact.
    ///
    /// Defaults to the latest alias. The current file is copied aside first
    /// (non-fatal if that fails) and remains on disk as a manual recovery
    /// path; there is no automatic rollback when the restored file fails the
    /// integrity gate.
    pub fn restore_from_backup(&self, backup_name: Option<&str>) -> Result<String> {
        let name = backup_name.unwrap_or(&self.config.latest_alias);
        info!(name, "Starting restore from backup");

        let data = self.store.get(name).map_err(|err| match err {
            TalentError::NotFound(_) => TalentError::NotFound(format!("backup not found: {name}")),
            other => other,
        })?;
        let decoded = artifact::decode(&data)?;

        let db_path = self.sync.local_db_path().to_path_buf();
        if db_path.exists() {
            let aside = db_path.with_extension(format!(
                "pre_restore_{}",
                Utc::now().format(TIMESTAMP_FORMAT)
            ));
            match fs::copy(&db_path, &aside) {
                Ok(_) => info!(path = %aside.display(), "current database copied aside"),
                Err(err) => warn!("failed to set aside current database before restore: {err}"),
            }
        }

        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&db_path, &decoded.image)?;

        schema::verify_database_file(&db_path)?;

        // the restored state becomes canonical remotely too
        if !self.sync.upload(true) {
            warn!("restored database could not be pushed to the canonical blob; retry sync manually");
        }

        info!(name, "Database restored successfully");
        Ok(format!("Database restored from {name}"))
    }

    /// Enumerate named backups, newest first. The latest alias is excluded.
    pub fn list_backups(&self, limit: Option<usize>) -> Result<Vec<BackupInfo>> {
        let objects = self.store.list("backup_")?;
        let mut backups: Vec<BackupInfo> = objects
            .iter()
            .filter(|object| object.key != self.config.latest_alias)
            .map(parse_backup_object)
            .collect();

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            backups.truncate(limit);
        }
        Ok(backups)
    }

    /// Delete one named backup.
    pub fn delete_backup(&self, name: &str) -> Result<()> {
        if !self.store.exists(name) {
            return Err(TalentError::NotFound(format!("backup not found: {name}")));
        }
        self.store.delete(name)?;
        info!(name, "Backup deleted");
        Ok(())
    }

    /// Delete every backup older than the retention window. Never touches
    /// the latest alias.
    pub fn cleanup_old_backups(&self) -> Result<(usize, Vec<String>)> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let mut deleted = Vec::new();

        for backup in self.list_backups(None)? {
            if backup.timestamp >= cutoff || backup.name == self.config.latest_alias {
                continue;
            }
            match self.delete_backup(&backup.name) {
                Ok(()) => deleted.push(backup.name),
                Err(err) => warn!(name = %backup.name, "failed to delete expired backup: {err}"),
            }
        }

        if !deleted.is_empty() {
            info!(count = deleted.len(), "Expired backups removed");
        }
        Ok((deleted.len(), deleted))
    }

    /// Catalogue statistics plus engine counters.
    pub fn get_backup_stats(&self) -> Result<BackupStats> {
        let backups = self.list_backups(None)?;

        let total_size_bytes: u64 = backups.iter().map(|b| b.size_bytes).sum();
        let avg_backup_interval_hours = if backups.len() >= 2 {
            let span = backups[0].timestamp - backups[backups.len() - 1].timestamp;
            span.num_seconds() as f64 / 3600.0 / (backups.len() - 1) as f64
        } else {
            0.0
        };

        let mut backups_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for backup in &backups {
            *backups_by_kind
                .entry(backup.kind.as_str().to_string())
                .or_default() += 1;
        }

        Ok(BackupStats {
            total_backups: backups.len(),
            total_size_bytes,
            total_size_mb: total_size_bytes as f64 / (1024.0 * 1024.0),
            latest_backup: backups.first().cloned(),
            avg_backup_interval_hours,
            backups_by_kind,
            retention_days: self.config.retention_days,
            auto_backup_enabled: self.config.auto_backup_enabled,
            backup_in_progress: self.in_progress.load(Ordering::SeqCst),
            last_backup_time: *self.last_backup_time.lock().unwrap(),
            attempts: self.attempts.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        })
    }

    /// Health verdict: unreachable store is unhealthy; stale backups (>48h)
    /// or a failure rate above 20% is a warning; a footprint above 1GB is an
    /// advisory issue that does not change the state.
    pub fn get_backup_health(&self) -> BackupHealth {
        let mut status = HealthState::Healthy;
        let mut issues = Vec::new();

        let backups = match self.store.list("backup_") {
            Ok(objects) => Some(objects),
            Err(err) => {
                status = HealthState::Unhealthy;
                issues.push(format!("backup store unreachable: {err}"));
                None
            }
        };

        if let Some(objects) = &backups {
            let newest = (*self.last_backup_time.lock().unwrap()).or_else(|| {
                objects
                    .iter()
                    .map(parse_backup_object)
                    .map(|b| b.timestamp)
                    .max()
            });
            match newest {
                Some(time) => {
                    let hours = (Utc::now() - time).num_minutes() as f64 / 60.0;
                    if hours > 48.0 {
                        if status == HealthState::Healthy {
                            status = HealthState::Warning;
                        }
                        issues.push(format!("last backup was {hours:.1} hours ago"));
                    }
                }
                None => {
                    if status == HealthState::Healthy {
                        status = HealthState::Warning;
                    }
                    issues.push("no backups found".to_string());
                }
            }

            let total_mb: f64 = objects.iter().map(|o| o.size).sum::<u64>() as f64 / (1024.0 * 1024.0);
            if total_mb > 1024.0 {
                issues.push(format!("backup storage usage is high: {total_mb:.1} MB"));
            }
        }

        let attempts = self.attempts.load(Ordering::SeqCst);
        let failures = self.failures.load(Ordering::SeqCst);
        if attempts > 0 && failures * 5 > attempts {
            if status == HealthState::Healthy {
                status = HealthState::Warning;
            }
            issues.push(format!("{failures} of {attempts} backup attempts failed"));
        }

        BackupHealth {
            status,
            issues,
            checked_at: Utc::now(),
        }
    }

    /// Everything restorable: the latest alias first, then named backups
    /// newest first.
    pub fn get_restore_points(&self) -> Result<Vec<RestorePoint>> {
        let mut points = Vec::new();

        for object in self.store.list(&self.config.latest_alias)? {
            if object.key == self.config.latest_alias {
                points.push(RestorePoint {
                    name: object.key,
                    timestamp: object.last_modified,
                    kind: "latest".to_string(),
                    size_bytes: object.size,
                });
            }
        }

        for backup in self.list_backups(None)? {
            points.push(RestorePoint {
                name: backup.name,
                timestamp: Some(backup.timestamp),
                kind: backup.kind.as_str().to_string(),
                size_bytes: backup.size_bytes,
            });
        }
        Ok(points)
    }

    /// Record one completed write. Fires an automatic backup when the counter
    /// reaches the configured threshold, then resets it. Independent of the
    /// time-based scheduler.
    pub fn note_write(&self) {
        let count = self.write_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count < self.config.write_trigger_threshold {
            return;
        }
        self.write_counter.store(0, Ordering::SeqCst);
        debug!(count, "write threshold reached, creating automatic backup");
        match self.create_backup(BackupKind::Auto, true, true) {
            Ok(info) => info!(name = %info.name, "write-triggered backup created"),
            Err(TalentError::BackupInProgress) => {
                debug!("write-triggered backup skipped, one already running")
            }
            Err(err) => warn!("write-triggered backup failed: {err}"),
        }
    }

    /// Start the scheduler loop: wake on the configured interval and create
    /// an automatic backup when none exists yet or the newest is older than
    /// the age threshold. Successful runs trigger retention cleanup; failed
    /// cycles re-arm sooner and never kill the loop.
    pub fn start_scheduler(self: &Arc<Self>) -> Ticker {
        let engine = Arc::clone(self);
        Ticker::spawn(
            "backup-scheduler",
            self.config.schedule_interval,
            self.config.schedule_error_interval,
            move || {
                if !engine.should_auto_backup() {
                    return Ok(());
                }
                info!("Creating scheduled automatic backup");
                engine.create_backup(BackupKind::Auto, true, true)?;
                if let Err(err) = engine.cleanup_old_backups() {
                    warn!("retention cleanup failed: {err}");
                }
                Ok(())
            },
        )
    }

    fn should_auto_backup(&self) -> bool {
        let last = (*self.last_backup_time.lock().unwrap()).or_else(|| {
            self.list_backups(Some(1))
                .ok()
                .and_then(|backups| backups.first().map(|b| b.timestamp))
        });
        match last {
            None => true,
            Some(time) => {
                Utc::now() - time > chrono::Duration::hours(self.config.max_backup_age_hours)
            }
        }
    }

    fn candidate_count(&self) -> Result<u64> {
        let conn = self.sync.connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))?)
    }

    fn put_with_retry(&self, key: &str, data: &[u8]) -> Result<()> {
        self.config
            .retry
            .run("backup_upload", |_attempt| match self.store.put(key, data) {
                Ok(()) => Ok(()),
                Err(err) if err.is_transient() => Err(transient_error!("backup_upload", err)),
                Err(err) => Err(permanent_error!("backup_upload", err)),
            })
            .map_err(|err| TalentError::storage(format!("backup upload failed: {err}")))
    }

    /// Best-effort audit row; a failure to log never fails the backup.
    fn log_backup(&self, name: &str, status: &str, size: u64) {
        let result = self.sync.connection().and_then(|conn| {
            conn.execute(
                "INSERT INTO backup_log (backup_name, backup_time, status, file_size) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, Utc::now(), status, size as i64],
            )
            .map_err(Into::into)
        });
        if let Err(err) = result {
            warn!("failed to log backup operation: {err}");
        }
    }
}

fn backup_name(kind: BackupKind, timestamp: DateTime<Utc>, compress: bool) -> String {
    let extension = if compress { ".gz" } else { ".db" };
    format!(
        "backup_{}_{}{}",
        kind.as_str(),
        timestamp.format(TIMESTAMP_FORMAT),
        extension
    )
}

/// Parse kind and timestamp out of a backup name, falling back to the
/// object's own modification time when the name does not conform.
fn parse_backup_object(object: &ObjectInfo) -> BackupInfo {
    let compressed = object.key.ends_with(".gz");
    let mut kind = BackupKind::Unknown;
    let mut timestamp = object
        .last_modified
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    if let Some(rest) = object.key.strip_prefix("backup_") {
        let stem = rest.trim_end_matches(".gz").trim_end_matches(".db");
        if let Some((kind_str, ts_str)) = stem.split_once('_') {
            if let (Some(parsed_kind), Ok(naive)) = (
                BackupKind::parse(kind_str),
                NaiveDateTime::parse_from_str(ts_str, TIMESTAMP_FORMAT),
            ) {
                kind = parsed_kind;
                timestamp = Utc.from_utc_datetime(&naive);
            }
        }
    }

    BackupInfo {
        name: object.key.clone(),
        timestamp,
        size_bytes: object.size,
        kind,
        status: BackupStatus::Completed,
        compressed,
        metadata: BTreeMap::new(),
    }
}
