//! End-to-end scenarios through controller, matcher and state machine.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use siteclock_core::{
    Assignment, AttendanceStore, Config, Coordinate, Event, MemoryStore, Position, SchedulePoll,
    Site, TrackingController, TrackingSchedule,
};
use siteclock_core::schedule::{parse_hhmm, DayWindow};

fn site(id: &str, lat: f64, lon: f64, radius_m: f64) -> Site {
    Site {
        id: id.into(),
        name: id.into(),
        address: String::new(),
        center: Coordinate::new(lat, lon),
        radius_m,
    }
}

fn assign(store: &MemoryStore, employee: &str, site_id: &str) {
    store.assign(Assignment {
        employee_id: employee.into(),
        site_id: site_id.into(),
        start_date: None,
        end_date: None,
    });
}

fn monday_schedule(start: &str, end: &str) -> TrackingSchedule {
    let mut schedule = TrackingSchedule::all_disabled();
    schedule.set_window(
        Weekday::Mon,
        DayWindow::enabled(parse_hhmm(start).unwrap(), parse_hhmm(end).unwrap()),
    );
    schedule
}

// 2025-06-02 is a Monday.
fn monday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn sample(h: u32, m: u32, lat: f64, lon: f64) -> Position {
    Position {
        coordinate: Coordinate::new(lat, lon),
        captured_at: Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap(),
        accuracy_m: Some(5.0),
    }
}

/// Monday 07:00-18:00, 100 m fence. Enter at 08:00, leave at 12:00,
/// re-enter at 13:00, schedule end at 18:00 while still inside.
#[test]
fn full_workday_scenario() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(site("yard", 40.0, -74.0, 100.0));
    assign(&store, "e1", "yard");
    store.set_schedule("e1", monday_schedule("07:00", "18:00"));

    let mut controller =
        TrackingController::new("e1".into(), store.clone(), Config::default()).unwrap();

    // 06:30 -- before the window.
    assert_eq!(
        controller.poll_schedule(monday(6, 30)).unwrap(),
        SchedulePoll::Unchanged
    );

    // 07:00 -- window opens.
    assert_eq!(
        controller.poll_schedule(monday(7, 0)).unwrap(),
        SchedulePoll::StartSampling
    );

    // 08:00 -- inside the fence: record opens at 08:00.
    controller
        .handle_sample(&sample(8, 0, 40.0, -74.0), monday(8, 0))
        .unwrap();
    let status = controller.status();
    assert!(status.clocked_in);
    assert_eq!(
        status.since,
        Some(Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap())
    );

    // Repeated samples inside: no duplicate records.
    for minute in [5, 10, 30] {
        controller
            .handle_sample(&sample(8, minute, 40.0002, -74.0), monday(8, minute))
            .unwrap();
    }
    assert_eq!(store.records().len(), 1);

    // 12:00 -- ~1.1 km away: record closes, duration 4 h.
    controller
        .handle_sample(&sample(12, 0, 40.01, -74.0), monday(12, 0))
        .unwrap();
    assert!(!controller.status().clocked_in);
    let records = store.records();
    assert_eq!(records[0].duration().unwrap().num_hours(), 4);

    // 13:00 -- back inside: second record opens.
    controller
        .handle_sample(&sample(13, 0, 40.0, -74.0), monday(13, 0))
        .unwrap();
    assert!(controller.status().clocked_in);

    // 18:00 -- window closes while still on site: forced clock-out.
    assert_eq!(
        controller.poll_schedule(monday(18, 0)).unwrap(),
        SchedulePoll::StopSampling
    );
    assert!(!controller.status().clocked_in);
    let records = store.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_open()));
}

/// Two overlapping fences: entering the overlap opens exactly one record,
/// tagged to the nearer site.
#[test]
fn overlapping_fences_open_one_record_for_nearer_site() {
    let store = Arc::new(MemoryStore::new());
    // Centers ~160 m apart, radius 300 m each: large overlap region.
    store.add_site(site("south", 40.0, -74.0, 300.0));
    store.add_site(site("north", 40.00144, -74.0, 300.0));
    assign(&store, "e1", "south");
    assign(&store, "e1", "north");
    store.set_schedule("e1", monday_schedule("07:00", "18:00"));

    let mut controller =
        TrackingController::new("e1".into(), store.clone(), Config::default()).unwrap();
    controller.poll_schedule(monday(7, 0)).unwrap();

    // In the overlap, closer to "north".
    controller
        .handle_sample(&sample(9, 0, 40.0011, -74.0), monday(9, 0))
        .unwrap();

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].site_id, "north");

    // Drifting inside the overlap must not bounce between sites.
    controller
        .handle_sample(&sample(9, 5, 40.0006, -74.0), monday(9, 5))
        .unwrap();
    assert_eq!(store.records().len(), 1);
    assert_eq!(controller.status().site_id.as_deref(), Some("north"));
}

/// Persistence write fails on the clock-in attempt: state stays `Out`, no
/// record exists, and the retry succeeds once the store recovers.
#[test]
fn clock_in_retries_after_store_failure() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(site("yard", 40.0, -74.0, 100.0));
    assign(&store, "e1", "yard");
    store.set_schedule("e1", monday_schedule("07:00", "18:00"));

    let mut config = Config::default();
    config.tracking.retry_backoff_base_secs = 1;
    let mut controller =
        TrackingController::new("e1".into(), store.clone(), config).unwrap();
    controller.poll_schedule(monday(7, 0)).unwrap();

    store.fail_next_creates(1);
    assert!(controller
        .handle_sample(&sample(8, 0, 40.0, -74.0), monday(8, 0))
        .is_err());
    assert!(!controller.status().clocked_in);
    assert!(store.records().is_empty());

    // Store recovered; next sample past the backoff clocks in.
    controller
        .handle_sample(&sample(8, 1, 40.0, -74.0), monday(8, 1))
        .unwrap();
    assert!(controller.status().clocked_in);
    assert_eq!(store.records().len(), 1);
    assert_eq!(
        store.records()[0].clock_in,
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 1, 0).unwrap()
    );
}

/// A restarted session resumes the open record instead of double-clocking.
#[test]
fn restart_resumes_open_record() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(site("yard", 40.0, -74.0, 100.0));
    assign(&store, "e1", "yard");
    store.set_schedule("e1", monday_schedule("07:00", "18:00"));

    {
        let mut controller =
            TrackingController::new("e1".into(), store.clone(), Config::default()).unwrap();
        controller.poll_schedule(monday(7, 0)).unwrap();
        controller
            .handle_sample(&sample(8, 0, 40.0, -74.0), monday(8, 0))
            .unwrap();
    }

    // New controller over the same store.
    let mut controller =
        TrackingController::new("e1".into(), store.clone(), Config::default()).unwrap();
    let status = controller.status();
    assert!(status.clocked_in);
    assert_eq!(status.site_id.as_deref(), Some("yard"));

    controller.poll_schedule(monday(7, 30)).unwrap();
    controller
        .handle_sample(&sample(8, 30, 40.0, -74.0), monday(8, 30))
        .unwrap();
    assert_eq!(store.records().len(), 1, "no duplicate record after restart");
}

/// An invariant violation staged from a non-core write path is surfaced,
/// not repaired.
#[test]
fn invariant_violation_is_a_hard_error() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(site("yard", 40.0, -74.0, 100.0));
    assign(&store, "e1", "yard");

    let t = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
    store.create_record("e1", "yard", t, None).unwrap();
    store.insert_record_raw(siteclock_core::AttendanceRecord {
        id: "rogue".into(),
        employee_id: "e1".into(),
        site_id: "yard".into(),
        clock_in: t,
        clock_out: None,
        clock_in_coordinate: None,
    });

    let err = match TrackingController::new("e1".into(), store, Config::default()) {
        Ok(_) => panic!("two open records must be surfaced"),
        Err(e) => e,
    };
    assert!(matches!(
        err,
        siteclock_core::CoreError::InvariantViolation { open_records: 2, .. }
    ));
}

/// The event stream reports the transitions in order for live display.
#[test]
fn event_stream_orders_transitions() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(site("yard", 40.0, -74.0, 100.0));
    assign(&store, "e1", "yard");
    store.set_schedule("e1", monday_schedule("07:00", "18:00"));

    let mut controller =
        TrackingController::new("e1".into(), store, Config::default()).unwrap();
    let mut rx = controller.subscribe();

    controller.poll_schedule(monday(7, 0)).unwrap();
    controller
        .handle_sample(&sample(8, 0, 40.0, -74.0), monday(8, 0))
        .unwrap();
    controller
        .handle_sample(&sample(12, 0, 40.01, -74.0), monday(12, 0))
        .unwrap();
    controller.poll_schedule(monday(18, 0)).unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event {
            Event::TrackingStarted { .. } => "started",
            Event::TrackingStopped { .. } => "stopped",
            Event::ClockedIn { .. } => "in",
            Event::ClockedOut { .. } => "out",
            _ => "other",
        });
    }
    assert_eq!(kinds, vec!["started", "in", "out", "stopped"]);
}
