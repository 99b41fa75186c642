//! # Siteclock Core Library
//!
//! Core business logic for Siteclock, a workforce attendance tracker:
//! employees are assigned to physical job sites with weekly tracking
//! schedules, and the library decides "is this employee currently present
//! at an assigned site during an authorized window", recording clock-in
//! and clock-out events accordingly. All operations are available through
//! a standalone CLI binary; GUI shells are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Attendance state machine**: deterministic, caller-driven; every
//!   input carries its timestamp and the machine holds authoritative
//!   clock-in state
//! - **Tracking controller**: the only stateful orchestrator -- schedule
//!   polling, sampling lifecycle, synchronous sample processing
//! - **Storage**: SQLite-backed store and TOML-based configuration
//! - **Sampler**: location acquisition as a cancellable position stream
//!
//! ## Key Components
//!
//! - [`AttendanceMachine`]: clock-in/clock-out state machine
//! - [`TrackingController`]: per-session orchestrator
//! - [`GeofenceSet`]: circular geofence membership
//! - [`TrackingSchedule`]: weekly authorized tracking windows
//! - [`Database`]: persistent site/assignment/record storage

pub mod attendance;
pub mod controller;
pub mod error;
pub mod events;
pub mod geo;
pub mod geofence;
pub mod model;
pub mod sampler;
pub mod schedule;
pub mod storage;

pub use attendance::{AttendanceMachine, AttendanceState};
pub use controller::{SchedulePoll, TrackingController, TrackingStatus};
pub use error::{CoreError, LocationError, Result, ScheduleError, StoreError};
pub use events::Event;
pub use geo::{distance_m, Coordinate, EARTH_RADIUS_M};
pub use geofence::{GeofenceSet, SiteMatch};
pub use model::{
    Assignment, AttendanceRecord, EmployeeId, Position, RecordId, Site, SiteId,
};
pub use sampler::{PositionSource, PositionSubscription, ReplaySource};
pub use schedule::{parse_hhmm, weekday_from_index, DayWindow, TrackingSchedule};
pub use storage::{AttendanceStore, Config, Database, MemoryStore, ScheduleDefaults, TrackingConfig};
