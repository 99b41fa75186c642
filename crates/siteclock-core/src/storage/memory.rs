//! In-memory store with failure injection.
//!
//! Backs the state machine and controller tests; also useful as a scratch
//! store for replay dry-runs. Failure counters make the next N writes fail
//! with `StoreError::Unavailable` so retry paths can be exercised.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::AttendanceStore;
use crate::error::StoreError;
use crate::geo::Coordinate;
use crate::model::{Assignment, AttendanceRecord, Site};
use crate::schedule::TrackingSchedule;

#[derive(Debug, Default)]
struct Inner {
    sites: Vec<Site>,
    assignments: Vec<Assignment>,
    schedules: HashMap<String, TrackingSchedule>,
    records: Vec<AttendanceRecord>,
    fail_creates: u32,
    fail_closes: u32,
    next_record_seq: u64,
}

/// Thread-safe in-memory implementation of [`AttendanceStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_site(&self, site: Site) {
        self.lock().sites.push(site);
    }

    pub fn assign(&self, assignment: Assignment) {
        self.lock().assignments.push(assignment);
    }

    pub fn set_schedule(&self, employee_id: &str, schedule: TrackingSchedule) {
        self.lock().schedules.insert(employee_id.into(), schedule);
    }

    /// Make the next `n` `create_record` calls fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.lock().fail_creates = n;
    }

    /// Make the next `n` `close_record` calls fail.
    pub fn fail_next_closes(&self, n: u32) {
        self.lock().fail_closes = n;
    }

    /// Snapshot of all records, for assertions.
    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.lock().records.clone()
    }

    /// Insert a record directly, bypassing the state machine. Exists so
    /// tests can stage invariant violations.
    pub fn insert_record_raw(&self, record: AttendanceRecord) {
        self.lock().records.push(record);
    }
}

impl AttendanceStore for MemoryStore {
    fn assigned_sites(&self, employee_id: &str, date: NaiveDate) -> Result<Vec<Site>, StoreError> {
        let inner = self.lock();
        let site_ids: Vec<&str> = inner
            .assignments
            .iter()
            .filter(|a| a.employee_id == employee_id && a.covers(date))
            .map(|a| a.site_id.as_str())
            .collect();
        Ok(inner
            .sites
            .iter()
            .filter(|s| site_ids.contains(&s.id.as_str()))
            .cloned()
            .collect())
    }

    fn tracking_schedule(
        &self,
        employee_id: &str,
    ) -> Result<Option<TrackingSchedule>, StoreError> {
        Ok(self.lock().schedules.get(employee_id).cloned())
    }

    fn open_records(&self, employee_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| r.employee_id == employee_id && r.is_open())
            .cloned()
            .collect())
    }

    fn create_record(
        &self,
        employee_id: &str,
        site_id: &str,
        clock_in: DateTime<Utc>,
        coordinate: Option<Coordinate>,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut inner = self.lock();
        if inner.fail_creates > 0 {
            inner.fail_creates -= 1;
            return Err(StoreError::Unavailable("injected create failure".into()));
        }
        inner.next_record_seq += 1;
        let record = AttendanceRecord {
            id: format!("rec-{}", inner.next_record_seq),
            employee_id: employee_id.into(),
            site_id: site_id.into(),
            clock_in,
            clock_out: None,
            clock_in_coordinate: coordinate,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    fn close_record(&self, record_id: &str, clock_out: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_closes > 0 {
            inner.fail_closes -= 1;
            return Err(StoreError::Unavailable("injected close failure".into()));
        }
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("record '{record_id}'")))?;
        record.clock_out = Some(clock_out);
        Ok(())
    }
}
