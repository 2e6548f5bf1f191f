/*!
Record store: CRUD and search over candidate rows.

Every live connection comes from the sync engine, and every successful
insert/update ends by asking the sync engine to push the file back to the
canonical blob. A failed push leaves the write locally persisted and is
reported as a warning, not as a failure of the write itself.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{info, warn};

use crate::candidate::{collections, Candidate, Experience};
use crate::sync::SyncEngine;
use crate::{Result, TalentError};

const CANDIDATE_COLUMNS: &str = "name, current_role, email, phone, notice_period, current_salary, \
     industry, desired_salary, highest_qualification, experience, skills, qualifications, \
     achievements, special_skills, created_at, updated_at";

/// Conjunctive search filter; empty fields are ignored.
///
/// Text fields match as substrings. `experience_years` is derived from the
/// serialized experience list and therefore evaluated after the fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub name: Option<String>,
    pub email: Option<String>,
    pub current_role: Option<String>,
    pub industry: Option<String>,
    pub highest_qualification: Option<String>,
    pub special_skills: Option<String>,
    pub experience_years: Option<usize>,
}

impl SearchCriteria {
    /// Static field-to-column map; criteria never name columns themselves.
    fn text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", self.name.as_deref()),
            ("email", self.email.as_deref()),
            ("current_role", self.current_role.as_deref()),
            ("industry", self.industry.as_deref()),
            ("highest_qualification", self.highest_qualification.as_deref()),
            ("special_skills", self.special_skills.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| match value {
            Some(v) if !v.trim().is_empty() => Some((column, v)),
            _ => None,
        })
        .collect()
    }
}

/// Aggregates shown on the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub total_candidates: u64,
    pub unique_industries: u64,
    /// Average experience-entry count across candidates whose experience
    /// column parses; rows with malformed data are skipped, not zero-counted.
    pub avg_experience: f64,
    pub database_size_mb: f64,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// A row from the backup_log audit table.
#[derive(Debug, Clone, Serialize)]
pub struct BackupLogEntry {
    pub backup_name: String,
    pub backup_time: Option<DateTime<Utc>>,
    pub status: String,
    pub file_size: Option<u64>,
}

/// Data-access layer over the candidates table.
pub struct RecordStore {
    sync: Arc<SyncEngine>,
    max_search_results: usize,
}

impl RecordStore {
    pub fn new(sync: Arc<SyncEngine>, max_search_results: usize) -> Self {
        Self {
            sync,
            max_search_results,
        }
    }

    /// Insert a new candidate.
    ///
    /// Fails with [`TalentError::DuplicateEmail`] when the email is taken; a
    /// UNIQUE violation from the engine maps to the same condition, covering
    /// the race between the pre-check and the insert.
    pub fn insert(&self, candidate: &Candidate) -> Result<()> {
        candidate.validate()?;
        let conn = self.sync.connection()?;

        if self.lookup(&conn, &candidate.email)?.is_some() {
            warn!(email = %candidate.email, "insert rejected, email already present");
            return Err(TalentError::DuplicateEmail(candidate.email.clone()));
        }

        let now = Utc::now();
        let result = conn.execute(
            &format!("INSERT INTO candidates ({CANDIDATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"),
            params![
                candidate.name,
                candidate.current_role,
                candidate.email,
                candidate.phone,
                candidate.notice_period,
                candidate.current_salary,
                candidate.industry,
                candidate.desired_salary,
                candidate.highest_qualification,
                collections::to_json(&candidate.experience)?,
                collections::to_json(&candidate.skills)?,
                collections::to_json(&candidate.qualifications)?,
                collections::to_json(&candidate.achievements)?,
                candidate.special_skills,
                now,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(TalentError::DuplicateEmail(candidate.email.clone()));
            }
            Err(err) => return Err(err.into()),
        }
        drop(conn);

        info!(email = %candidate.email, "candidate inserted");
        self.push_after_write(&candidate.email);
        Ok(())
    }

    /// Replace all fields of an existing candidate, keyed by email.
    ///
    /// The email itself is never changed here; re-keying a record is an
    /// explicit delete + insert at the caller.
    pub fn update(&self, candidate: &Candidate) -> Result<()> {
        candidate.validate()?;
        let conn = self.sync.connection()?;

        if self.lookup(&conn, &candidate.email)?.is_none() {
            return Err(TalentError::CandidateNotFound(candidate.email.clone()));
        }

        conn.execute(
            "UPDATE candidates SET name = ?1, current_role = ?2, phone = ?3, notice_period = ?4, \
             current_salary = ?5, industry = ?6, desired_salary = ?7, highest_qualification = ?8, \
             experience = ?9, skills = ?10, qualifications = ?11, achievements = ?12, \
             special_skills = ?13, updated_at = ?14 WHERE email = ?15",
            params![
                candidate.name,
                candidate.current_role,
                candidate.phone,
                candidate.notice_period,
                candidate.current_salary,
                candidate.industry,
                candidate.desired_salary,
                candidate.highest_qualification,
                collections::to_json(&candidate.experience)?,
                collections::to_json(&candidate.skills)?,
                collections::to_json(&candidate.qualifications)?,
                collections::to_json(&candidate.achievements)?,
                candidate.special_skills,
                Utc::now(),
                candidate.email,
            ],
        )?;
        drop(conn);

        info!(email = %candidate.email, "candidate updated");
        self.push_after_write(&candidate.email);
        Ok(())
    }

    /// Remove the row. Pushing the change to the canonical blob is the
    /// caller's responsibility.
    pub fn delete(&self, email: &str) -> Result<()> {
        let conn = self.sync.connection()?;
        let affected = conn.execute("DELETE FROM candidates WHERE email = ?1", params![email])?;
        if affected == 0 {
            return Err(TalentError::CandidateNotFound(email.to_string()));
        }
        info!(email, "candidate deleted");
        Ok(())
    }

    /// Exact-match lookup by the unique email key.
    pub fn get_by_email(&self, email: &str) -> Result<Option<Candidate>> {
        let conn = self.sync.connection()?;
        self.lookup(&conn, email)
    }

    /// Conjunctive substring search, with derived criteria applied in memory.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Candidate>> {
        let conn = self.sync.connection()?;

        let fields = criteria.text_fields();
        let mut sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates");
        if !fields.is_empty() {
            let filters: Vec<String> = fields
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{column} LIKE ?{}", i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }
        let bind_values: Vec<String> = fields
            .iter()
            .map(|(_, value)| format!("%{}%", value.trim()))
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bind_values), row_to_candidate)?;

        let mut candidates = Vec::new();
        for row in rows {
            let candidate = row?;
            if let Some(min_entries) = criteria.experience_years {
                // derived from the serialized experience list, so it cannot
                // be pushed into SQL
                if candidate.experience.len() < min_entries {
                    continue;
                }
            }
            candidates.push(candidate);
            if candidates.len() >= self.max_search_results {
                break;
            }
        }
        Ok(candidates)
    }

    /// Unfiltered fetch with deserialized collections, for in-memory scoring.
    pub fn all_candidates(&self) -> Result<Vec<Candidate>> {
        let conn = self.sync.connection()?;
        let mut stmt = conn.prepare(&format!("SELECT {CANDIDATE_COLUMNS} FROM candidates"))?;
        let rows = stmt.query_map([], row_to_candidate)?;
        rows.map(|row| row.map_err(Into::into)).collect()
    }

    /// Dashboard aggregates, combined with the sync engine's file status.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let conn = self.sync.connection()?;

        let total_candidates: u64 =
            conn.query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))?;
        let unique_industries: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT industry) FROM candidates \
             WHERE industry IS NOT NULL AND industry != ''",
            [],
            |row| row.get(0),
        )?;

        let mut stmt =
            conn.prepare("SELECT experience FROM candidates WHERE experience IS NOT NULL")?;
        let raw_rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut total_entries = 0usize;
        let mut parseable_rows = 0usize;
        for raw in raw_rows {
            let raw = raw?;
            match collections::parse::<Experience>(Some(&raw)) {
                Ok(entries) if !entries.is_empty() => {
                    total_entries += entries.len();
                    parseable_rows += 1;
                }
                Ok(_) => {}
                Err(_) => {} // skipped, not counted as zero
            }
        }
        let avg_experience = if parseable_rows > 0 {
            total_entries as f64 / parseable_rows as f64
        } else {
            0.0
        };

        let status = self.sync.status();
        Ok(DashboardStats {
            total_candidates,
            unique_industries,
            avg_experience,
            database_size_mb: status.local_db_size as f64 / (1024.0 * 1024.0),
            last_sync_time: status.last_sync_time,
        })
    }

    /// Recent rows from the backup_log audit table, newest first.
    pub fn backup_history(&self, limit: usize) -> Result<Vec<BackupLogEntry>> {
        let conn = self.sync.connection()?;
        let mut stmt = conn.prepare(
            "SELECT backup_name, backup_time, status, file_size FROM backup_log \
             ORDER BY backup_time DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(BackupLogEntry {
                backup_name: row.get(0)?,
                backup_time: row.get(1)?,
                status: row.get(2)?,
                file_size: row.get(3)?,
            })
        })?;
        rows.map(|row| row.map_err(Into::into)).collect()
    }

    fn lookup(&self, conn: &Connection, email: &str) -> Result<Option<Candidate>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE email = ?1"
        ))?;
        let mut rows = stmt.query_map(params![email], row_to_candidate)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Blocking upload after a successful write. Failure leaves the write in
    /// the "persisted locally, not yet durable remotely" state.
    fn push_after_write(&self, email: &str) {
        if !self.sync.upload(true) {
            warn!(
                email,
                "write persisted locally but canonical upload failed; will retry on next sync"
            );
        }
    }
}

fn row_to_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    let experience_raw: Option<String> = row.get(9)?;
    let skills_raw: Option<String> = row.get(10)?;
    let qualifications_raw: Option<String> = row.get(11)?;
    let achievements_raw: Option<String> = row.get(12)?;

    Ok(Candidate {
        name: row.get(0)?,
        current_role: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        notice_period: row.get(4)?,
        current_salary: row.get(5)?,
        industry: row.get(6)?,
        desired_salary: row.get(7)?,
        highest_qualification: row.get(8)?,
        experience: collections::parse_or_empty(experience_raw.as_deref()),
        skills: collections::parse_or_empty(skills_raw.as_deref()),
        qualifications: collections::parse_or_empty(qualifications_raw.as_deref()),
        achievements: collections::parse_or_empty(achievements_raw.as_deref()),
        special_skills: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
