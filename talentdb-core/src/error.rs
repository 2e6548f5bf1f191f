/*!
Error types for the TalentDB core.
*/

use thiserror::Error;

/// Result type used throughout the TalentDB core.
pub type Result<T> = std::result::Result<T, TalentError>;

/// Errors that can occur in the sync, record and backup paths.
#[derive(Error, Debug)]
pub enum TalentError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the local SQLite cache file
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Object store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The requested object does not exist in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert attempted with an email that is already present. An expected
    /// condition, distinct from unexpected failures so callers can offer an
    /// overwrite workflow.
    #[error("A candidate with email '{0}' already exists")]
    DuplicateEmail(String),

    /// Update/delete targeted an email with no matching row
    #[error("Candidate with email '{0}' not found")]
    CandidateNotFound(String),

    /// A backup is already running; concurrent requests are rejected, not queued
    #[error("Backup already in progress")]
    BackupInProgress,

    /// Consistency check failures (restore gate, envelope hash)
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// Invalid backup artifact format
    #[error("Invalid artifact format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl TalentError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Whether this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            TalentError::Storage(msg) => {
                msg.contains("timed out")
                    || msg.contains("dispatch")
                    || msg.contains("InternalError")
                    || msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("500")
            }
            TalentError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
