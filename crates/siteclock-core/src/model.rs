//! Domain types shared across the crate: sites, assignments, positions
//! and attendance records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Unique identifier for an employee.
pub type EmployeeId = String;

/// Unique identifier for a site.
pub type SiteId = String;

/// Unique identifier for an attendance record.
pub type RecordId = String;

/// A physical job site with a circular geofence around its center.
///
/// Immutable during a tracking session; created and edited by an
/// administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    /// Display only; never interpreted by the core.
    #[serde(default)]
    pub address: String,
    pub center: Coordinate,
    /// Geofence radius in meters.
    pub radius_m: f64,
}

/// Binds an employee to a site, optionally time-boxed by date.
///
/// Multiple simultaneous assignments are legal; the state machine handles
/// more than one active geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub employee_id: EmployeeId,
    pub site_id: SiteId,
    /// First day the assignment is in force (inclusive). `None` = open start.
    pub start_date: Option<NaiveDate>,
    /// Last day the assignment is in force (inclusive). `None` = open end.
    pub end_date: Option<NaiveDate>,
}

impl Assignment {
    /// Whether the assignment is in force on `date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start_date {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if date > end {
                return false;
            }
        }
        true
    }
}

/// A single GPS sample. Transient: consumed by the matcher, never stored
/// individually.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
    /// Estimated horizontal accuracy in meters, if the device reports one.
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

/// One clock-in/clock-out pair for an employee at a site.
///
/// Open (no clock-out) while the employee is clocked in. At most one open
/// record may exist per employee at any time; the attendance state machine
/// is the only component allowed to create or close records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub employee_id: EmployeeId,
    pub site_id: SiteId,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    /// Coordinate captured at clock-in, when the transition was driven by
    /// a position sample.
    pub clock_in_coordinate: Option<Coordinate>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }

    /// Duration between clock-in and clock-out, if closed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.clock_out.map(|out| out - self.clock_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn assignment_open_ended_covers_everything() {
        let a = Assignment {
            employee_id: "e1".into(),
            site_id: "s1".into(),
            start_date: None,
            end_date: None,
        };
        assert!(a.covers(NaiveDate::from_ymd_opt(1999, 1, 1).unwrap()));
        assert!(a.covers(NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()));
    }

    #[test]
    fn assignment_date_box_is_inclusive() {
        let a = Assignment {
            employee_id: "e1".into(),
            site_id: "s1".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 30),
        };
        assert!(!a.covers(NaiveDate::from_ymd_opt(2025, 5, 31).unwrap()));
        assert!(a.covers(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        assert!(a.covers(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!a.covers(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }

    #[test]
    fn record_duration() {
        let rec = AttendanceRecord {
            id: "r1".into(),
            employee_id: "e1".into(),
            site_id: "s1".into(),
            clock_in: Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap(),
            clock_out: Some(Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()),
            clock_in_coordinate: None,
        };
        assert!(!rec.is_open());
        assert_eq!(rec.duration().unwrap().num_hours(), 4);
    }
}
