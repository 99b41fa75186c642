//! The attendance state machine.
//!
//! Per employee there are two states: `Out` (no open record) and
//! `In(site)` (one open record). The machine combines schedule gating and
//! geofence membership into clock-in/clock-out transitions, deduplicated
//! against repeated samples of the same physical state: each membership
//! *change* produces at most one side effect.
//!
//! The machine exclusively owns record creation and closing. If a store
//! write fails, in-memory state does not advance; the same transition is
//! retried on the next evaluation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::geofence::SiteMatch;
use crate::model::{AttendanceRecord, EmployeeId, Position, RecordId, SiteId};
use crate::storage::AttendanceStore;

/// Attendance state of one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AttendanceState {
    Out,
    In {
        site_id: SiteId,
        record_id: RecordId,
        since: DateTime<Utc>,
    },
}

impl AttendanceState {
    pub fn is_in(&self) -> bool {
        matches!(self, AttendanceState::In { .. })
    }
}

/// Attendance state machine for a single employee.
///
/// No internal threads and no clock of its own: every input carries its
/// timestamp, so behavior is fully deterministic under test.
#[derive(Debug)]
pub struct AttendanceMachine {
    employee_id: EmployeeId,
    state: AttendanceState,
    /// Capture timestamp of the last processed sample. Samples older than
    /// this are dropped rather than re-ordered.
    last_capture: Option<DateTime<Utc>>,
}

impl AttendanceMachine {
    /// A fresh machine in the `Out` state.
    pub fn new(employee_id: EmployeeId) -> Self {
        Self {
            employee_id,
            state: AttendanceState::Out,
            last_capture: None,
        }
    }

    /// Build a machine from whatever open record the store holds, so a
    /// restarted session resumes instead of double-clocking.
    ///
    /// # Errors
    /// Returns [`CoreError::InvariantViolation`] if more than one open
    /// record exists; that is never silently resolved.
    pub fn resume(employee_id: EmployeeId, store: &dyn AttendanceStore) -> Result<Self> {
        let open = store.open_records(&employee_id)?;
        let state = match open.as_slice() {
            [] => AttendanceState::Out,
            [record] => AttendanceState::In {
                site_id: record.site_id.clone(),
                record_id: record.id.clone(),
                since: record.clock_in,
            },
            many => {
                return Err(CoreError::InvariantViolation {
                    employee_id,
                    open_records: many.len(),
                })
            }
        };
        Ok(Self {
            employee_id,
            state,
            last_capture: None,
        })
    }

    pub fn employee_id(&self) -> &str {
        &self.employee_id
    }

    pub fn state(&self) -> &AttendanceState {
        &self.state
    }

    /// Feed one position sample with its containment verdict through the
    /// machine.
    ///
    /// `contained` is the matcher output, nearest site first.
    /// `schedule_active` is the evaluator verdict for the sample's local
    /// time. Returns the events emitted by any transition; an unchanged
    /// membership state emits nothing.
    pub fn observe(
        &mut self,
        store: &dyn AttendanceStore,
        sample: &Position,
        contained: &[SiteMatch],
        schedule_active: bool,
    ) -> Result<Vec<Event>> {
        if let Some(last) = self.last_capture {
            if sample.captured_at < last {
                debug!(
                    employee = %self.employee_id,
                    captured_at = %sample.captured_at,
                    "dropping out-of-order sample"
                );
                return Ok(Vec::new());
            }
        }
        self.last_capture = Some(sample.captured_at);

        if !schedule_active {
            // Window closed mid-stream: force the employee out.
            return Ok(self
                .close_open(store, sample.captured_at, false)?
                .into_iter()
                .collect());
        }

        match self.state.clone() {
            AttendanceState::Out => match contained.first() {
                Some(best) => Ok(vec![self.open_record(
                    store,
                    &best.site_id,
                    sample.captured_at,
                    Some(sample),
                    false,
                )?]),
                None => Ok(Vec::new()),
            },
            AttendanceState::In { site_id, .. } => {
                // Keep the current site while it remains contained, even
                // if another overlapping fence is now nearer.
                if contained.iter().any(|m| m.site_id == site_id) {
                    return Ok(Vec::new());
                }

                let mut events = Vec::new();
                if let Some(event) = self.close_open(store, sample.captured_at, false)? {
                    events.push(event);
                }

                // Walked straight from one fence into another: open against
                // the nearest contained site in the same evaluation. A
                // failure here leaves the machine `Out` with the close
                // already committed; the clock-in is retried on the next
                // sample while containment persists.
                if let Some(best) = contained.first() {
                    match self.open_record(
                        store,
                        &best.site_id,
                        sample.captured_at,
                        Some(sample),
                        false,
                    ) {
                        Ok(event) => events.push(event),
                        Err(e) => {
                            warn!(
                                employee = %self.employee_id,
                                site = %best.site_id,
                                error = %e,
                                "clock-in after site switch failed, will retry"
                            );
                            events.push(Event::StoreRetryScheduled {
                                employee_id: self.employee_id.clone(),
                                message: e.to_string(),
                                at: sample.captured_at,
                            });
                        }
                    }
                }
                Ok(events)
            }
        }
    }

    /// Close the open record if there is one, e.g. because the schedule
    /// window ended or the session is shutting down.
    pub fn force_out(
        &mut self,
        store: &dyn AttendanceStore,
        at: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        self.close_open(store, at, false)
    }

    /// Explicit clock-in, accepted regardless of schedule and geofence
    /// state. An open record for a different site is closed first, then
    /// the new one is opened; from the caller's point of view this is one
    /// operation. A clock-in for the site already active is a no-op.
    pub fn manual_clock_in(
        &mut self,
        store: &dyn AttendanceStore,
        site_id: &str,
        position: Option<&Position>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        if let AttendanceState::In {
            site_id: current, ..
        } = &self.state
        {
            if current == site_id {
                return Ok(Vec::new());
            }
        }

        let mut events = Vec::new();
        if let Some(event) = self.close_open(store, at, true)? {
            events.push(event);
        }
        events.push(self.open_record(store, site_id, at, position, true)?);
        Ok(events)
    }

    /// Explicit clock-out. A no-op when already `Out`.
    pub fn manual_clock_out(
        &mut self,
        store: &dyn AttendanceStore,
        at: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        self.close_open(store, at, true)
    }

    /// Current status snapshot event.
    pub fn snapshot(&self, at: DateTime<Utc>) -> Event {
        match &self.state {
            AttendanceState::Out => Event::StatusSnapshot {
                employee_id: self.employee_id.clone(),
                clocked_in: false,
                site_id: None,
                since: None,
                at,
            },
            AttendanceState::In { site_id, since, .. } => Event::StatusSnapshot {
                employee_id: self.employee_id.clone(),
                clocked_in: true,
                site_id: Some(site_id.clone()),
                since: Some(*since),
                at,
            },
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn open_record(
        &mut self,
        store: &dyn AttendanceStore,
        site_id: &str,
        at: DateTime<Utc>,
        position: Option<&Position>,
        manual: bool,
    ) -> Result<Event> {
        let coordinate = position.map(|p| p.coordinate);
        let record: AttendanceRecord = store.create_record(&self.employee_id, site_id, at, coordinate)?;
        self.state = AttendanceState::In {
            site_id: record.site_id.clone(),
            record_id: record.id.clone(),
            since: record.clock_in,
        };
        info!(employee = %self.employee_id, site = %site_id, manual, "clocked in");
        Ok(Event::ClockedIn {
            employee_id: self.employee_id.clone(),
            site_id: record.site_id,
            record_id: record.id,
            at,
            latitude: coordinate.map(|c| c.latitude),
            longitude: coordinate.map(|c| c.longitude),
            manual,
        })
    }

    fn close_open(
        &mut self,
        store: &dyn AttendanceStore,
        at: DateTime<Utc>,
        manual: bool,
    ) -> Result<Option<Event>> {
        let (site_id, record_id) = match &self.state {
            AttendanceState::Out => return Ok(None),
            AttendanceState::In {
                site_id, record_id, ..
            } => (site_id.clone(), record_id.clone()),
        };

        store.close_record(&record_id, at)?;
        self.state = AttendanceState::Out;
        info!(employee = %self.employee_id, site = %site_id, manual, "clocked out");
        Ok(Some(Event::ClockedOut {
            employee_id: self.employee_id.clone(),
            site_id,
            record_id,
            at,
            manual,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn sample(h: u32, m: u32) -> Position {
        Position {
            coordinate: Coordinate::new(40.0, -74.0),
            captured_at: ts(h, m),
            accuracy_m: None,
        }
    }

    fn hit(site: &str, distance: f64) -> SiteMatch {
        SiteMatch {
            site_id: site.into(),
            distance_m: distance,
        }
    }

    #[test]
    fn enter_fence_clocks_in_once() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());

        let events = machine
            .observe(&store, &sample(8, 0), &[hit("s1", 10.0)], true)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ClockedIn { .. }));
        assert!(machine.state().is_in());

        // Same verdict again: no second side effect.
        let events = machine
            .observe(&store, &sample(8, 1), &[hit("s1", 12.0)], true)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn exit_fence_clocks_out() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(8, 0), &[hit("s1", 10.0)], true)
            .unwrap();

        let events = machine.observe(&store, &sample(12, 0), &[], true).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ClockedOut { .. }));
        assert_eq!(*machine.state(), AttendanceState::Out);

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].clock_out, Some(ts(12, 0)));
        assert_eq!(records[0].duration().unwrap().num_hours(), 4);
    }

    #[test]
    fn schedule_end_forces_clock_out_inside_fence() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(8, 0), &[hit("s1", 10.0)], true)
            .unwrap();

        // Still inside the fence, but the window closed.
        let events = machine
            .observe(&store, &sample(18, 0), &[hit("s1", 10.0)], false)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ClockedOut { .. }));
        assert_eq!(store.records()[0].clock_out, Some(ts(18, 0)));
    }

    #[test]
    fn overlap_prefers_nearest_when_out() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());

        let events = machine
            .observe(
                &store,
                &sample(8, 0),
                &[hit("near", 20.0), hit("far", 80.0)],
                true,
            )
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ClockedIn { site_id, .. } => assert_eq!(site_id, "near"),
            other => panic!("expected ClockedIn, got {other:?}"),
        }
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn current_site_kept_while_still_contained() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(8, 0), &[hit("a", 10.0)], true)
            .unwrap();

        // "b" is now nearer, but "a" still contains the employee.
        let events = machine
            .observe(&store, &sample(9, 0), &[hit("b", 5.0), hit("a", 60.0)], true)
            .unwrap();
        assert!(events.is_empty());
        match machine.state() {
            AttendanceState::In { site_id, .. } => assert_eq!(site_id, "a"),
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn leaving_one_fence_into_another_switches_site() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(8, 0), &[hit("a", 10.0)], true)
            .unwrap();

        let events = machine
            .observe(&store, &sample(10, 0), &[hit("b", 30.0)], true)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::ClockedOut { .. }));
        assert!(matches!(events[1], Event::ClockedIn { .. }));

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_open());
        assert!(records[1].is_open());
        assert_eq!(records[1].site_id, "b");
    }

    #[test]
    fn create_failure_leaves_state_out_and_retries() {
        let store = MemoryStore::new();
        store.fail_next_creates(1);
        let mut machine = AttendanceMachine::new("e1".into());

        let err = machine
            .observe(&store, &sample(8, 0), &[hit("s1", 10.0)], true)
            .expect_err("create should fail");
        assert!(matches!(err, CoreError::Store(_)));
        assert_eq!(*machine.state(), AttendanceState::Out);
        assert!(store.records().is_empty());

        // Store recovered; the next sample succeeds.
        let events = machine
            .observe(&store, &sample(8, 1), &[hit("s1", 10.0)], true)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn close_failure_keeps_machine_clocked_in() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(8, 0), &[hit("s1", 10.0)], true)
            .unwrap();

        store.fail_next_closes(1);
        let err = machine
            .observe(&store, &sample(12, 0), &[], true)
            .expect_err("close should fail");
        assert!(matches!(err, CoreError::Store(_)));
        assert!(machine.state().is_in());
        assert!(store.records()[0].is_open());

        // Retry succeeds once the store recovers.
        let events = machine.observe(&store, &sample(12, 1), &[], true).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!store.records()[0].is_open());
    }

    #[test]
    fn out_of_order_sample_is_dropped() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .observe(&store, &sample(9, 0), &[hit("s1", 10.0)], true)
            .unwrap();

        // A stale sample from before clock-in claims we were outside;
        // it must not close the record.
        let events = machine.observe(&store, &sample(8, 59), &[], true).unwrap();
        assert!(events.is_empty());
        assert!(machine.state().is_in());
    }

    #[test]
    fn manual_clock_in_and_out() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());

        let events = machine
            .manual_clock_in(&store, "s1", None, ts(7, 30))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(machine.state().is_in());

        // Manual clock-in for the same site again: no-op.
        let events = machine
            .manual_clock_in(&store, "s1", None, ts(7, 45))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.records().len(), 1);

        let event = machine.manual_clock_out(&store, ts(16, 0)).unwrap();
        assert!(event.is_some());
        assert_eq!(*machine.state(), AttendanceState::Out);
        assert!(machine.manual_clock_out(&store, ts(16, 1)).unwrap().is_none());
    }

    #[test]
    fn manual_clock_in_while_open_elsewhere_closes_first() {
        let store = MemoryStore::new();
        let mut machine = AttendanceMachine::new("e1".into());
        machine
            .manual_clock_in(&store, "s1", None, ts(8, 0))
            .unwrap();

        let events = machine
            .manual_clock_in(&store, "s2", None, ts(10, 0))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::ClockedOut { .. }));
        assert!(matches!(events[1], Event::ClockedIn { .. }));

        let open = store.open_records("e1").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].site_id, "s2");
    }

    #[test]
    fn resume_restores_open_record() {
        let store = MemoryStore::new();
        let rec = store.create_record("e1", "s1", ts(8, 0), None).unwrap();

        let machine = AttendanceMachine::resume("e1".into(), &store).unwrap();
        assert_eq!(
            *machine.state(),
            AttendanceState::In {
                site_id: "s1".into(),
                record_id: rec.id,
                since: ts(8, 0),
            }
        );
    }

    #[test]
    fn resume_detects_invariant_violation() {
        let store = MemoryStore::new();
        store.create_record("e1", "s1", ts(8, 0), None).unwrap();
        store.create_record("e1", "s2", ts(9, 0), None).unwrap();

        let err = AttendanceMachine::resume("e1".into(), &store).expect_err("must surface");
        match err {
            CoreError::InvariantViolation { open_records, .. } => assert_eq!(open_records, 2),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }
}
