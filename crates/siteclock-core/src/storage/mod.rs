mod config;
pub mod database;
pub mod memory;

pub use config::{Config, ScheduleDefaults, TrackingConfig};
pub use database::Database;
pub use memory::MemoryStore;

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

use crate::error::StoreError;
use crate::geo::Coordinate;
use crate::model::{AttendanceRecord, Site};
use crate::schedule::TrackingSchedule;

/// Narrow interface to the persistence collaborator.
///
/// The attendance state machine exclusively owns record creation and
/// closing; everything else in the core only reads. Implementations must
/// be safe to call from the tracking loop (`Send + Sync`).
pub trait AttendanceStore: Send + Sync {
    /// Sites the employee is assigned to on `date` (assignment date boxes
    /// are inclusive; open-ended assignments always match).
    fn assigned_sites(&self, employee_id: &str, date: NaiveDate) -> Result<Vec<Site>, StoreError>;

    /// Stored weekly schedule, or `None` if the employee has none (the
    /// caller falls back to the configured defaults).
    fn tracking_schedule(&self, employee_id: &str)
        -> Result<Option<TrackingSchedule>, StoreError>;

    /// All open records for the employee. More than one is an invariant
    /// violation; the store reports what exists and the state machine
    /// decides.
    fn open_records(&self, employee_id: &str) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Append a new open record.
    fn create_record(
        &self,
        employee_id: &str,
        site_id: &str,
        clock_in: DateTime<Utc>,
        coordinate: Option<Coordinate>,
    ) -> Result<AttendanceRecord, StoreError>;

    /// Set the clock-out timestamp on an open record.
    fn close_record(&self, record_id: &str, clock_out: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Returns `~/.config/siteclock[-dev]/` based on SITECLOCK_ENV, or the
/// directory named by SITECLOCK_DATA_DIR if set.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = if let Ok(explicit) = std::env::var("SITECLOCK_DATA_DIR") {
        PathBuf::from(explicit)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");
        let env = std::env::var("SITECLOCK_ENV").unwrap_or_else(|_| "production".to_string());
        if env == "dev" {
            base_dir.join("siteclock-dev")
        } else {
            base_dir.join("siteclock")
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
