/*!
Local cache file schema and integrity checks.

The canonical database holds exactly three tables: the candidate rows and two
append-only audit logs. The same DDL bootstraps a fresh file and backstops a
file that arrived without schema.
*/

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::{Result, TalentError};

/// Tables a restored or downloaded file must contain to be considered usable.
pub const REQUIRED_TABLES: [&str; 3] = ["candidates", "backup_log", "sync_log"];

/// Create the schema if it is not already present.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            current_role TEXT,
            email TEXT UNIQUE,
            phone TEXT,
            notice_period TEXT,
            current_salary TEXT,
            industry TEXT,
            desired_salary TEXT,
            highest_qualification TEXT,
            experience TEXT,      -- JSON list
            skills TEXT,          -- JSON list
            qualifications TEXT,  -- JSON list
            achievements TEXT,    -- JSON list
            special_skills TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS backup_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            backup_name TEXT NOT NULL,
            backup_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            status TEXT NOT NULL,
            file_size INTEGER
        );

        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sync_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            sync_type TEXT NOT NULL,  -- 'upload' or 'download'
            status TEXT NOT NULL,     -- 'success' or 'failed'
            message TEXT
        );
        "#,
    )?;
    Ok(())
}

/// Whether all required tables exist.
pub fn has_required_tables(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let names: HashSet<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(REQUIRED_TABLES.iter().all(|table| names.contains(*table)))
}

/// Storage-engine-level consistency check.
pub fn integrity_check(conn: &Connection) -> Result<bool> {
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    Ok(result == "ok")
}

/// Gate used after a restore: the file must pass the engine's own consistency
/// check and contain the required tables.
pub fn verify_database_file(path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    if !integrity_check(&conn)? {
        return Err(TalentError::IntegrityCheckFailed(
            "PRAGMA integrity_check reported corruption".to_string(),
        ));
    }
    if !has_required_tables(&conn)? {
        return Err(TalentError::IntegrityCheckFailed(format!(
            "required tables missing (need {})",
            REQUIRED_TABLES.join(", ")
        )));
    }
    Ok(())
}
