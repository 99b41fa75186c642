//! Core error types for siteclock-core.
//!
//! Transient failures (location, store writes) are recoverable: callers
//! retry them without tearing down the tracking loop. Invariant violations
//! are hard errors and are never auto-corrected.

use chrono::NaiveTime;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for siteclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence collaborator failed. Transient; the transition that
    /// triggered the write is retried on the next evaluation cycle.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Device location could not be acquired. Transient; tracking pauses
    /// and retries on the next cycle.
    #[error("location error: {0}")]
    Location(#[from] LocationError),

    /// Schedule definition errors
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// More than one open attendance record exists for an employee.
    /// Indicates a bug or a write from a non-core path; requires manual
    /// reconciliation and must never be silently resolved.
    #[error("invariant violation: employee '{employee_id}' has {open_records} open attendance records")]
    InvariantViolation {
        employee_id: String,
        open_records: usize,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Store-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Database is locked
    #[error("store is locked")]
    Locked,

    /// Store temporarily unreachable (remote backend, injected test failure)
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(e.to_string())
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("query returned no rows".into())
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Location acquisition errors.
#[derive(Error, Debug)]
pub enum LocationError {
    /// Device denied or failed to provide a position
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// No position arrived within the configured timeout
    #[error("no position within {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Schedule definition errors.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Windows must not span midnight: start must come before end within
    /// the same day.
    #[error("invalid window for {day}: start {start} must be before end {end}")]
    InvalidWindow {
        day: String,
        start: NaiveTime,
        end: NaiveTime,
    },

    /// Time string could not be parsed
    #[error("cannot parse time '{0}', expected HH:MM")]
    ParseTime(String),

    /// Weekday index out of range
    #[error("weekday index {0} out of range (0 = Monday .. 6 = Sunday)")]
    BadWeekday(u8),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
