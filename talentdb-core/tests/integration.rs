/*!
Integration tests for the sync engine, record store and session context,
running entirely against the in-memory object store.
*/

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use talentdb_core::storage::{MemoryStore, ObjectStore};
use talentdb_core::{
    BackupConfig, BackupEngine, Candidate, Experience, RecordStore, SearchCriteria,
    SessionContext, Skill, SyncConfig, SyncEngine,
};
use talentdb_retry::{BackoffStrategy, RetryPolicy};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    db_store: Arc<MemoryStore>,
    sync: Arc<SyncEngine>,
    records: Arc<RecordStore>,
    backups: Arc<BackupEngine>,
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(
        3,
        BackoffStrategy::Fixed {
            delay: Duration::ZERO,
        },
    )
}

fn harness() -> Harness {
    harness_with(BackupConfig::default())
}

fn harness_with(mut backup_config: BackupConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_store = Arc::new(MemoryStore::new());
    let backup_store = Arc::new(MemoryStore::new());

    let mut sync_config = SyncConfig::new(dir.path().join("candidates.db"), "candidates.db");
    sync_config.retry = instant_retry();
    backup_config.retry = instant_retry();

    let sync = SyncEngine::new(
        Arc::clone(&db_store) as Arc<dyn ObjectStore>,
        sync_config,
    )
    .unwrap();
    let records = Arc::new(RecordStore::new(Arc::clone(&sync), 100));
    let backups = Arc::new(BackupEngine::new(
        backup_store as Arc<dyn ObjectStore>,
        Arc::clone(&sync),
        backup_config,
    ));

    Harness {
        _dir: dir,
        db_store,
        sync,
        records,
        backups,
    }
}

fn session(h: &Harness) -> SessionContext {
    SessionContext::new(
        Arc::clone(&h.sync),
        Arc::clone(&h.records),
        Arc::clone(&h.backups),
    )
}

fn candidate_with_experience(name: &str, email: &str, entries: usize) -> Candidate {
    let mut candidate = Candidate::new(name, email);
    for i in 0..entries {
        candidate.experience.push(Experience {
            position: Some(format!("Role {i}")),
            company: Some("Initech".into()),
            responsibilities: vec!["build".into(), "review".into()],
            achievements: vec![format!("delivered project {i}")],
            technologies: vec!["Rust".into(), "SQLite".into()],
            ..Default::default()
        });
    }
    candidate
}

#[test]
fn duplicate_email_keeps_exactly_one_record() {
    let h = harness();

    h.records
        .insert(&Candidate::new("Jane Doe", "jane@x.com"))
        .unwrap();
    let err = h
        .records
        .insert(&Candidate::new("Jane Imposter", "jane@x.com"))
        .unwrap_err();
    assert!(matches!(
        err,
        talentdb_core::TalentError::DuplicateEmail(_)
    ));

    let all = h.records.all_candidates().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Jane Doe");
}

#[test]
fn duplicate_email_surfaces_display_message() {
    let h = harness();
    let ctx = session(&h);

    assert!(ctx.insert_candidate(&Candidate::new("Jane", "jane@x.com")).ok);
    let response = ctx.insert_candidate(&Candidate::new("Other", "jane@x.com"));
    assert!(!response.ok);
    assert!(response.message.contains("already exists"));
}

#[test]
fn force_refresh_is_idempotent_and_advances_sync_time() {
    let h = harness();

    assert!(h.sync.force_refresh());
    let first_bytes = fs::read(h.sync.local_db_path()).unwrap();
    let first_sync = h.sync.status().last_sync_time.unwrap();

    assert!(h.sync.force_refresh());
    let second_bytes = fs::read(h.sync.local_db_path()).unwrap();
    let second_sync = h.sync.status().last_sync_time.unwrap();

    assert_eq!(first_bytes, second_bytes, "no remote change, same content");
    assert!(second_sync > first_sync, "last_sync_time advances per call");
}

#[test]
fn nested_collections_roundtrip_in_order() {
    let h = harness();

    let mut stored = candidate_with_experience("Sam Rivers", "sam@x.com", 3);
    stored.skills = vec![
        Skill {
            name: "Rust".into(),
            proficiency: 4,
        },
        Skill {
            name: "SQL".into(),
            proficiency: 3,
        },
    ];
    stored.achievements = vec!["speaker".into(), "patent".into()];
    h.records.insert(&stored).unwrap();

    let loaded = h.records.get_by_email("sam@x.com").unwrap().unwrap();
    assert_eq!(loaded.experience.len(), 3);
    assert_eq!(loaded.experience, stored.experience);
    assert_eq!(loaded.skills, stored.skills);
    assert_eq!(loaded.achievements, stored.achievements);
    assert_eq!(
        loaded.experience[1].achievements,
        vec!["delivered project 1".to_string()]
    );
}

#[test]
fn concurrent_nonforced_upload_is_rejected_not_queued() {
    let h = harness();

    h.db_store.set_put_latency(Duration::from_millis(400));
    let sync = Arc::clone(&h.sync);
    let slow_upload = std::thread::spawn(move || sync.upload(true));

    // give the forced upload time to take the lock and enter the store call
    std::thread::sleep(Duration::from_millis(100));
    assert!(
        !h.sync.upload(false),
        "non-forced upload during an in-flight upload must no-op"
    );

    assert!(slow_upload.join().unwrap());
    h.db_store.set_put_latency(Duration::ZERO);
}

#[test]
fn search_filters_on_derived_experience_years() {
    let h = harness();

    for (name, email, entries) in [
        ("One Role", "one@x.com", 1),
        ("Two Roles", "two@x.com", 2),
        ("Three Roles", "three@x.com", 3),
    ] {
        h.records
            .insert(&candidate_with_experience(name, email, entries))
            .unwrap();
    }

    let criteria = SearchCriteria {
        experience_years: Some(2),
        ..Default::default()
    };
    let results = h.records.search(&criteria).unwrap();

    let mut emails: Vec<&str> = results.iter().map(|c| c.email.as_str()).collect();
    emails.sort();
    assert_eq!(emails, vec!["three@x.com", "two@x.com"]);
}

#[test]
fn search_combines_text_criteria_conjunctively() {
    let h = harness();

    let mut fintech = Candidate::new("Ada Smith", "ada@x.com");
    fintech.industry = Some("Fintech".into());
    fintech.current_role = Some("Data Engineer".into());
    h.records.insert(&fintech).unwrap();

    let mut health = Candidate::new("Ada Jones", "ada.j@x.com");
    health.industry = Some("Healthcare".into());
    health.current_role = Some("Data Engineer".into());
    h.records.insert(&health).unwrap();

    let criteria = SearchCriteria {
        name: Some("ada".into()),
        industry: Some("fin".into()),
        ..Default::default()
    };
    let results = h.records.search(&criteria).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].email, "ada@x.com");
}

#[test]
fn inserted_candidate_reads_back_with_skills_and_created_at() {
    let h = harness();
    let ctx = session(&h);

    let mut jane = Candidate::new("Jane Doe", "jane@x.com");
    jane.skills.push(Skill {
        name: "Python".into(),
        proficiency: 5,
    });
    assert!(ctx.insert_candidate(&jane).ok);

    let loaded = ctx.get_candidate_by_email("jane@x.com").unwrap();
    assert_eq!(
        loaded.skills,
        vec![Skill {
            name: "Python".into(),
            proficiency: 5
        }]
    );
    assert!(loaded.created_at.is_some());
    assert!(loaded.updated_at.is_some());
}

#[test]
fn connection_recovers_after_local_file_deleted() {
    let h = harness();

    h.records
        .insert(&Candidate::new("Kept Remote", "kept@x.com"))
        .unwrap();

    fs::remove_file(h.sync.local_db_path()).unwrap();
    assert!(!h.sync.local_db_exists());

    // must trigger a download and come back usable
    let conn = h.sync.connection().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn writes_become_durable_in_the_canonical_blob() {
    let h = harness();

    h.records
        .insert(&Candidate::new("Durable", "durable@x.com"))
        .unwrap();

    // the canonical blob, read back as a database, holds the new row
    let remote = h.db_store.get("candidates.db").unwrap();
    let copy_dir = TempDir::new().unwrap();
    let copy_path = copy_dir.path().join("remote_copy.db");
    fs::write(&copy_path, &remote).unwrap();

    let conn = rusqlite::Connection::open(&copy_path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM candidates WHERE email = 'durable@x.com'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1, "insert ends with a blocking upload");
}

#[test]
fn new_session_reconciles_and_sees_remote_changes() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let shared_store = Arc::new(MemoryStore::new());
    let backup_store = Arc::new(MemoryStore::new());

    let mut config_a = SyncConfig::new(dir_a.path().join("candidates.db"), "candidates.db");
    config_a.retry = instant_retry();
    let mut config_b = SyncConfig::new(dir_b.path().join("candidates.db"), "candidates.db");
    config_b.retry = instant_retry();

    // instance B snapshots the remote before A writes anything
    let sync_a =
        SyncEngine::new(Arc::clone(&shared_store) as Arc<dyn ObjectStore>, config_a).unwrap();
    let sync_b =
        SyncEngine::new(Arc::clone(&shared_store) as Arc<dyn ObjectStore>, config_b).unwrap();

    let records_a = Arc::new(RecordStore::new(Arc::clone(&sync_a), 100));
    records_a
        .insert(&Candidate::new("Fresh Hire", "fresh@x.com"))
        .unwrap();

    let records_b = Arc::new(RecordStore::new(Arc::clone(&sync_b), 100));
    assert!(
        records_b.get_by_email("fresh@x.com").unwrap().is_none(),
        "stale local copy does not see the other instance's write"
    );

    let backups_b = Arc::new(BackupEngine::new(
        backup_store as Arc<dyn ObjectStore>,
        Arc::clone(&sync_b),
        BackupConfig::default(),
    ));
    let ctx_b = SessionContext::new(sync_b, records_b, backups_b);
    let found = ctx_b.get_candidate_by_email("fresh@x.com");
    assert_eq!(
        found.map(|c| c.name),
        Some("Fresh Hire".to_string()),
        "session reconciliation refreshes from remote before first read"
    );
}

#[test]
fn logout_flags_the_engine_for_refresh() {
    let h = harness();
    let ctx = session(&h);

    ctx.insert_candidate(&Candidate::new("Anyone", "any@x.com"));
    assert!(!h.sync.status().force_download_flagged);

    ctx.logout();
    assert!(h.sync.status().force_download_flagged);

    // the next gateway access clears the flag after reconciling
    h.sync.connection().unwrap();
    assert!(!h.sync.status().force_download_flagged);
}

#[test]
fn update_replaces_fields_wholesale_and_keeps_email() {
    let h = harness();

    let mut original = candidate_with_experience("Before", "same@x.com", 2);
    original.industry = Some("Retail".into());
    h.records.insert(&original).unwrap();

    let mut replacement = Candidate::new("After", "same@x.com");
    replacement.industry = Some("Banking".into());
    replacement.skills.push(Skill {
        name: "Go".into(),
        proficiency: 2,
    });
    h.records.update(&replacement).unwrap();

    let loaded = h.records.get_by_email("same@x.com").unwrap().unwrap();
    assert_eq!(loaded.name, "After");
    assert_eq!(loaded.industry.as_deref(), Some("Banking"));
    assert!(loaded.experience.is_empty(), "collections replaced wholesale");
    assert_eq!(loaded.skills.len(), 1);
}

#[test]
fn update_of_missing_candidate_fails() {
    let h = harness();
    let err = h
        .records
        .update(&Candidate::new("Ghost", "ghost@x.com"))
        .unwrap_err();
    assert!(matches!(
        err,
        talentdb_core::TalentError::CandidateNotFound(_)
    ));
}

#[test]
fn delete_removes_row_and_session_pushes_the_change() {
    let h = harness();
    let ctx = session(&h);

    assert!(ctx.insert_candidate(&Candidate::new("Leaver", "leaver@x.com")).ok);
    assert!(ctx.delete_candidate("leaver@x.com").ok);
    assert!(ctx.get_candidate_by_email("leaver@x.com").is_none());

    let response = ctx.delete_candidate("leaver@x.com");
    assert!(!response.ok);
    assert!(response.message.contains("not found"));
}

#[test]
fn dashboard_stats_skip_malformed_experience_rows() {
    let h = harness();

    let mut two = candidate_with_experience("Two", "two@x.com", 2);
    two.industry = Some("Healthcare".into());
    h.records.insert(&two).unwrap();
    h.records
        .insert(&candidate_with_experience("Four", "four@x.com", 4))
        .unwrap();
    let mut plain = Candidate::new("Plain", "plain@x.com");
    plain.industry = Some("Fintech".into());
    h.records.insert(&plain).unwrap();

    // corrupt one experience column behind the store's back
    let conn = h.sync.connection().unwrap();
    conn.execute(
        "UPDATE candidates SET experience = 'not json' WHERE email = 'four@x.com'",
        [],
    )
    .unwrap();
    drop(conn);

    let stats = h.records.dashboard_stats().unwrap();
    assert_eq!(stats.total_candidates, 3);
    assert_eq!(stats.unique_industries, 2);
    // only the parseable, non-empty row counts toward the average
    assert!((stats.avg_experience - 2.0).abs() < f64::EPSILON);
    assert!(stats.database_size_mb > 0.0);
    assert!(stats.last_sync_time.is_some());

    // reads degrade to an empty collection for the corrupted row
    let corrupted = h.records.get_by_email("four@x.com").unwrap().unwrap();
    assert!(corrupted.experience.is_empty());
}

#[test]
fn search_results_are_cached_per_criteria_until_invalidated() {
    let h = harness();
    let ctx = session(&h);

    ctx.insert_candidate(&Candidate::new("Cached", "cached@x.com"));
    let criteria = SearchCriteria {
        name: Some("Cached".into()),
        ..Default::default()
    };
    assert_eq!(ctx.search_candidates(&criteria).len(), 1);

    // mutate behind the cache; same criteria, same session -> cached view
    h.records
        .insert(&Candidate::new("Cached Two", "cached2@x.com"))
        .unwrap();
    assert_eq!(ctx.search_candidates(&criteria).len(), 1);

    // a write through the session invalidates the cache
    ctx.insert_candidate(&Candidate::new("Cached Three", "cached3@x.com"));
    assert_eq!(ctx.search_candidates(&criteria).len(), 3);
}

#[test]
fn sync_log_records_upload_outcomes() {
    let h = harness();

    h.records
        .insert(&Candidate::new("Logged", "logged@x.com"))
        .unwrap();

    let conn = h.sync.connection().unwrap();
    let uploads: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sync_log WHERE sync_type = 'upload' AND status = 'success'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(uploads >= 1);
}

#[test]
fn auto_sync_ticker_uploads_in_background() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut config = SyncConfig::new(dir.path().join("candidates.db"), "candidates.db");
    config.retry = instant_retry();
    config.sync_interval = Duration::from_millis(20);

    let sync = SyncEngine::new(Arc::clone(&store) as Arc<dyn ObjectStore>, config).unwrap();
    let before = sync.status().last_sync_time.unwrap();

    let ticker = sync.start_auto_sync();
    std::thread::sleep(Duration::from_millis(200));
    ticker.stop();

    let after = sync.status().last_sync_time.unwrap();
    assert!(after > before, "background loop performed uploads");
}
