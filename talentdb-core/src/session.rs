/*!
Per-session application context.

One `SessionContext` exists per logical user session; there are no
process-wide singletons. The context guarantees that the first data access
after login is preceded by an authoritative refresh from the canonical blob,
without refreshing on every request, and it translates core results into
display-ready responses for the calling surface. Read paths degrade (empty
results, zeroed stats) instead of propagating errors; write paths return a
message intended for direct display.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::backup::{
    BackupEngine, BackupHealth, BackupInfo, BackupKind, BackupStats, RestorePoint,
};
use crate::candidate::Candidate;
use crate::records::{BackupLogEntry, DashboardStats, RecordStore, SearchCriteria};
use crate::sync::{SyncEngine, SyncStatus};
use crate::TalentError;

/// Outcome of a write-path operation; `message` is intended for direct
/// display to the user.
#[derive(Debug, Clone)]
pub struct OpResponse {
    pub ok: bool,
    pub message: String,
}

impl OpResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Explicit per-session state plus handles to the three engines.
pub struct SessionContext {
    sync: Arc<SyncEngine>,
    records: Arc<RecordStore>,
    backups: Arc<BackupEngine>,
    /// True once this session has reconciled with the remote store
    reconciled: AtomicBool,
    /// Search results tied to the current view of the data
    cached_search: Mutex<Option<(SearchCriteria, Vec<Candidate>)>>,
}

impl SessionContext {
    /// A fresh session: not yet reconciled with remote.
    pub fn new(
        sync: Arc<SyncEngine>,
        records: Arc<RecordStore>,
        backups: Arc<BackupEngine>,
    ) -> Self {
        Self {
            sync,
            records,
            backups,
            reconciled: AtomicBool::new(false),
            cached_search: Mutex::new(None),
        }
    }

    /// First data access in a session reconciles with the remote store.
    ///
    /// The flag flips regardless of the refresh outcome so a flaky remote
    /// cannot cause a refresh storm; on failure the local copy serves until
    /// the next successful sync.
    fn ensure_reconciled(&self) {
        if self.reconciled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("new session detected, refreshing database from the canonical blob");
        if !self.sync.force_refresh() {
            warn!("session refresh failed, continuing with the local copy");
        }
    }

    /// End the session: the next one starts unreconciled, the engine is
    /// flagged to re-download on its next access, and cached results tied to
    /// the now-stale view are dropped.
    pub fn logout(&self) {
        self.reconciled.store(false, Ordering::SeqCst);
        self.sync.request_refresh();
        self.invalidate_search_cache();
        info!("session closed, next login will refresh from the canonical blob");
    }

    // --- candidate CRUD surface ---

    pub fn insert_candidate(&self, candidate: &Candidate) -> OpResponse {
        self.ensure_reconciled();
        match self.records.insert(candidate) {
            Ok(()) => {
                self.backups.note_write();
                self.invalidate_search_cache();
                OpResponse::success("Candidate saved successfully")
            }
            Err(err @ TalentError::DuplicateEmail(_)) => OpResponse::failure(err.to_string()),
            Err(err) => {
                error!("error inserting candidate: {err}");
                OpResponse::failure(format!("Error saving candidate: {err}"))
            }
        }
    }

    pub fn update_candidate(&self, candidate: &Candidate) -> OpResponse {
        self.ensure_reconciled();
        match self.records.update(candidate) {
            Ok(()) => {
                self.backups.note_write();
                self.invalidate_search_cache();
                OpResponse::success("Candidate updated successfully")
            }
            Err(err @ TalentError::CandidateNotFound(_)) => OpResponse::failure(err.to_string()),
            Err(err) => {
                error!("error updating candidate: {err}");
                OpResponse::failure(format!("Error updating candidate: {err}"))
            }
        }
    }

    pub fn delete_candidate(&self, email: &str) -> OpResponse {
        self.ensure_reconciled();
        match self.records.delete(email) {
            Ok(()) => {
                // the record store leaves the follow-on sync to its caller
                if !self.sync.upload(true) {
                    warn!(email, "delete persisted locally but canonical upload failed");
                }
                self.invalidate_search_cache();
                OpResponse::success("Candidate deleted successfully")
            }
            Err(err @ TalentError::CandidateNotFound(_)) => OpResponse::failure(err.to_string()),
            Err(err) => {
                error!("error deleting candidate: {err}");
                OpResponse::failure(format!("Error deleting candidate: {err}"))
            }
        }
    }

    pub fn get_candidate_by_email(&self, email: &str) -> Option<Candidate> {
        self.ensure_reconciled();
        match self.records.get_by_email(email) {
            Ok(candidate) => candidate,
            Err(err) => {
                error!("error getting candidate by email: {err}");
                None
            }
        }
    }

    /// Search with per-session result caching; repeating the same criteria
    /// against an unchanged view reuses the cached results.
    pub fn search_candidates(&self, criteria: &SearchCriteria) -> Vec<Candidate> {
        self.ensure_reconciled();

        if let Some((cached_criteria, cached_results)) = &*self.cached_search.lock().unwrap() {
            if cached_criteria == criteria {
                return cached_results.clone();
            }
        }

        match self.records.search(criteria) {
            Ok(results) => {
                *self.cached_search.lock().unwrap() =
                    Some((criteria.clone(), results.clone()));
                results
            }
            Err(err) => {
                error!("error searching candidates: {err}");
                Vec::new()
            }
        }
    }

    pub fn get_dashboard_stats(&self) -> DashboardStats {
        self.ensure_reconciled();
        match self.records.dashboard_stats() {
            Ok(stats) => stats,
            Err(err) => {
                error!("error getting dashboard stats: {err}");
                DashboardStats::default()
            }
        }
    }

    pub fn get_backup_history(&self, limit: usize) -> Vec<BackupLogEntry> {
        match self.records.backup_history(limit) {
            Ok(entries) => entries,
            Err(err) => {
                error!("error getting backup history: {err}");
                Vec::new()
            }
        }
    }

    // --- sync surface ---

    pub fn sync_to_blob(&self, force: bool) -> bool {
        self.sync.upload(force)
    }

    pub fn sync_from_blob(&self, force: bool) -> bool {
        let refreshed = self.sync.download(force);
        if refreshed {
            self.invalidate_search_cache();
        }
        refreshed
    }

    pub fn force_refresh(&self) -> bool {
        let refreshed = self.sync.force_refresh();
        if refreshed {
            self.invalidate_search_cache();
        }
        refreshed
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    // --- backup surface ---

    pub fn create_backup(
        &self,
        kind: BackupKind,
        compress: bool,
        include_metadata: bool,
    ) -> (OpResponse, Option<BackupInfo>) {
        match self.backups.create_backup(kind, compress, include_metadata) {
            Ok(info) => (
                OpResponse::success(format!("Backup created successfully: {}", info.name)),
                Some(info),
            ),
            Err(TalentError::BackupInProgress) => {
                (OpResponse::failure("Backup already in progress"), None)
            }
            Err(err) => (OpResponse::failure(format!("Backup failed: {err}")), None),
        }
    }

    pub fn restore_from_backup(&self, backup_name: Option<&str>) -> OpResponse {
        match self.backups.restore_from_backup(backup_name) {
            Ok(message) => {
                self.invalidate_search_cache();
                OpResponse::success(message)
            }
            Err(err) => OpResponse::failure(format!("Restore failed: {err}")),
        }
    }

    pub fn list_backups(&self, limit: Option<usize>) -> Vec<BackupInfo> {
        match self.backups.list_backups(limit) {
            Ok(backups) => backups,
            Err(err) => {
                error!("error listing backups: {err}");
                Vec::new()
            }
        }
    }

    pub fn delete_backup(&self, name: &str) -> OpResponse {
        match self.backups.delete_backup(name) {
            Ok(()) => OpResponse::success(format!("Backup deleted successfully: {name}")),
            Err(err @ TalentError::NotFound(_)) => OpResponse::failure(err.to_string()),
            Err(err) => OpResponse::failure(format!("Failed to delete backup {name}: {err}")),
        }
    }

    pub fn cleanup_old_backups(&self) -> (usize, Vec<String>) {
        match self.backups.cleanup_old_backups() {
            Ok(result) => result,
            Err(err) => {
                error!("error cleaning up old backups: {err}");
                (0, Vec::new())
            }
        }
    }

    pub fn get_backup_stats(&self) -> Option<BackupStats> {
        match self.backups.get_backup_stats() {
            Ok(stats) => Some(stats),
            Err(err) => {
                error!("error getting backup stats: {err}");
                None
            }
        }
    }

    pub fn get_backup_health(&self) -> BackupHealth {
        self.backups.get_backup_health()
    }

    pub fn get_restore_points(&self) -> Vec<RestorePoint> {
        match self.backups.get_restore_points() {
            Ok(points) => points,
            Err(err) => {
                error!("error getting restore points: {err}");
                Vec::new()
            }
        }
    }

    fn invalidate_search_cache(&self) {
        *self.cached_search.lock().unwrap() = None;
    }
}
