/*!
# TalentDB Core Engine

Cache-coherent, blob-backed candidate database.

The canonical SQLite image lives as a single blob in an object store. Each
application instance mirrors it to a local cache file, serves every query from
that file, and pushes whole-file replacements back:

- The **sync engine** owns the local file's lifecycle: download on start,
  upload on demand, a periodic background upload, force-refresh, and the
  mutual-exclusion lock that keeps uploads from racing each other.
- The **record store** issues SQL against the local file, always obtaining its
  connection from the sync engine and always pushing after a write.
- The **backup engine** persists point-in-time copies (optionally compressed,
  optionally wrapped in a metadata envelope) to a separate container, on a
  schedule, after enough writes, or on demand.
- The **session context** makes login-triggers-refresh explicit: one context
  per logical user session, no process-wide state.

## Usage

```rust,no_run
use std::sync::Arc;
use talentdb_core::{AppConfig, Candidate, SessionContext, Skill};

let config = AppConfig::from_env();
config.validate()?;

let engines = talentdb_core::open(&config)?;
let session = SessionContext::new(
    Arc::clone(&engines.sync),
    Arc::clone(&engines.records),
    Arc::clone(&engines.backups),
);

let mut candidate = Candidate::new("Jane Doe", "jane@x.com");
candidate.skills.push(Skill { name: "Python".into(), proficiency: 5 });

let response = session.insert_candidate(&candidate);
assert!(response.ok, "{}", response.message);
# Ok::<(), talentdb_core::TalentError>(())
```
*/

pub mod artifact;
pub mod backup;
pub mod candidate;
pub mod compression;
pub mod config;
pub mod error;
pub mod records;
pub mod schema;
pub mod session;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use backup::{
    BackupEngine, BackupHealth, BackupInfo, BackupKind, BackupStats, BackupStatus, HealthState,
    RestorePoint,
};
pub use candidate::{Candidate, Experience, Qualification, Skill};
pub use config::{AppConfig, BackupConfig, StoreBackend, StoreConfig, SyncConfig};
pub use error::{Result, TalentError};
pub use records::{BackupLogEntry, DashboardStats, RecordStore, SearchCriteria};
pub use session::{OpResponse, SessionContext};
#[cfg(feature = "s3")]
pub use storage::S3ObjectStore;
pub use storage::{LocalDirStore, MemoryStore, ObjectStore};
pub use sync::{SyncEngine, SyncStatus};
pub use tasks::Ticker;

use std::sync::Arc;

/// Application identity carried into backup metadata envelopes.
pub const APP_NAME: &str = "TalentDB";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The three engines wired together over one backend.
pub struct Engines {
    pub sync: Arc<SyncEngine>,
    pub records: Arc<RecordStore>,
    pub backups: Arc<BackupEngine>,
}

/// Construct the engines from configuration: one store per container, the
/// sync engine reconciled with remote, record and backup layers on top.
///
/// Background loops are not started here; call
/// [`SyncEngine::start_auto_sync`] and [`BackupEngine::start_scheduler`] and
/// hold the returned tickers for as long as the loops should run.
pub fn open(config: &AppConfig) -> Result<Engines> {
    config.validate()?;

    let db_store = storage::build_store(&config.store, &config.db_container)?;
    let backup_store = storage::build_store(&config.store, &config.backup_container)?;

    let sync = SyncEngine::new(db_store, config.sync.clone())?;
    let records = Arc::new(RecordStore::new(
        Arc::clone(&sync),
        config.max_search_results,
    ));
    let backups = Arc::new(BackupEngine::new(
        backup_store,
        Arc::clone(&sync),
        config.backup.clone(),
    ));

    Ok(Engines {
        sync,
        records,
        backups,
    })
}
