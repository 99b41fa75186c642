use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EmployeeId, RecordId, SiteId};

/// Every attendance status change produces an Event.
/// The presentation layer subscribes to these for live display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Schedule window opened; continuous sampling started.
    TrackingStarted {
        employee_id: EmployeeId,
        at: DateTime<Utc>,
    },
    /// Schedule window closed or session stopped; sampling cancelled.
    TrackingStopped {
        employee_id: EmployeeId,
        at: DateTime<Utc>,
    },
    ClockedIn {
        employee_id: EmployeeId,
        site_id: SiteId,
        record_id: RecordId,
        at: DateTime<Utc>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        manual: bool,
    },
    ClockedOut {
        employee_id: EmployeeId,
        site_id: SiteId,
        record_id: RecordId,
        at: DateTime<Utc>,
        manual: bool,
    },
    /// A store write failed; the same transition will be retried.
    StoreRetryScheduled {
        employee_id: EmployeeId,
        message: String,
        at: DateTime<Utc>,
    },
    /// Full status snapshot for the UI.
    StatusSnapshot {
        employee_id: EmployeeId,
        clocked_in: bool,
        site_id: Option<SiteId>,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
}
