//! The tracking controller: the only stateful orchestrator.
//!
//! On a fixed cadence it re-evaluates the schedule; when the verdict
//! flips to active it starts continuous sampling, and when it flips back
//! it stops sampling and forces a final clock-out evaluation. Each
//! delivered position flows synchronously through the matcher and the
//! state machine before the next sample is accepted, so rapid successive
//! samples can never interleave transitions.
//!
//! The core methods are caller-driven and take explicit clock values, so
//! every path is deterministic under test; `run` is the wall-clock async
//! loop built on top of them. One controller per active employee session.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::attendance::{AttendanceMachine, AttendanceState};
use crate::error::Result;
use crate::events::Event;
use crate::geofence::GeofenceSet;
use crate::model::{EmployeeId, Position, SiteId};
use crate::sampler::{PositionSource, PositionSubscription};
use crate::schedule::TrackingSchedule;
use crate::storage::{AttendanceStore, Config};

/// Outcome of one schedule evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePoll {
    /// Verdict flipped inactive -> active: start sampling.
    StartSampling,
    /// Verdict flipped active -> inactive: sampling stopped, terminal
    /// clock-out evaluation already flushed.
    StopSampling,
    Unchanged,
}

/// Status snapshot for the presentation layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackingStatus {
    pub employee_id: EmployeeId,
    pub clocked_in: bool,
    pub site_id: Option<SiteId>,
    pub since: Option<DateTime<Utc>>,
    /// Whether a schedule window is currently open and sampling runs.
    pub sampling: bool,
    /// Last transient error, retained for non-blocking display. The last
    /// successful state above stays valid while this is set.
    pub last_error: Option<String>,
}

/// Orchestrates schedule evaluation, sampling, geofence matching and the
/// attendance state machine for one employee session.
pub struct TrackingController<S: AttendanceStore> {
    employee_id: EmployeeId,
    store: Arc<S>,
    config: Config,
    machine: AttendanceMachine,
    fences: GeofenceSet,
    schedule: TrackingSchedule,
    sampling: bool,
    consecutive_failures: u32,
    /// Store writes are suppressed until this capture-time instant after
    /// a failure (capped exponential backoff).
    backoff_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    events: broadcast::Sender<Event>,
}

impl<S: AttendanceStore> TrackingController<S> {
    /// Build a controller, resuming any open record from the store.
    ///
    /// # Errors
    /// Fails on store errors or when more than one open record exists
    /// (invariant violation).
    pub fn new(employee_id: EmployeeId, store: Arc<S>, config: Config) -> Result<Self> {
        let machine = AttendanceMachine::resume(employee_id.clone(), store.as_ref())?;
        let (events, _) = broadcast::channel(64);
        let mut controller = Self {
            employee_id,
            store,
            config,
            machine,
            fences: GeofenceSet::default(),
            schedule: TrackingSchedule::all_disabled(),
            sampling: false,
            consecutive_failures: 0,
            backoff_until: None,
            last_error: None,
            events,
        };
        controller.refresh(Local::now().date_naive())?;
        Ok(controller)
    }

    /// Subscribe to the live status-change event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn status(&self) -> TrackingStatus {
        let (clocked_in, site_id, since) = match self.machine.state() {
            AttendanceState::Out => (false, None, None),
            AttendanceState::In { site_id, since, .. } => {
                (true, Some(site_id.clone()), Some(*since))
            }
        };
        TrackingStatus {
            employee_id: self.employee_id.clone(),
            clocked_in,
            site_id,
            since,
            sampling: self.sampling,
            last_error: self.last_error.clone(),
        }
    }

    /// Reload assigned sites and schedule so administrative edits become
    /// visible without restarting the session.
    fn refresh(&mut self, date: chrono::NaiveDate) -> Result<()> {
        let sites = self.store.assigned_sites(&self.employee_id, date)?;
        self.fences = GeofenceSet::new(sites);
        self.schedule = match self.store.tracking_schedule(&self.employee_id)? {
            Some(schedule) => schedule,
            None => self.config.default_schedule.to_schedule()?,
        };
        Ok(())
    }

    /// One schedule evaluation cycle. Call at least once per minute with
    /// the employee's local time.
    ///
    /// With no assigned sites tracking is a no-op, not an error: the
    /// schedule may be open but sampling never starts.
    pub fn poll_schedule(&mut self, local_now: NaiveDateTime) -> Result<SchedulePoll> {
        self.refresh(local_now.date())?;
        let should_sample = self.schedule.is_active_at(local_now) && !self.fences.is_empty();
        // Window edges are stamped at the evaluated instant, not whenever
        // the poll happened to run.
        let at = local_now.and_utc();

        let poll = match (self.sampling, should_sample) {
            (false, true) => {
                self.sampling = true;
                info!(employee = %self.employee_id, "schedule window opened, starting sampling");
                self.emit(Event::TrackingStarted {
                    employee_id: self.employee_id.clone(),
                    at,
                });
                SchedulePoll::StartSampling
            }
            (true, false) => {
                // Schedule end clocks the employee out even while still
                // physically on site. Only mark sampling stopped once the
                // close is committed, so a failed write is retried on the
                // next cycle.
                if let Some(event) = self.machine.force_out(self.store.as_ref(), at)? {
                    self.emit(event);
                }
                self.sampling = false;
                info!(employee = %self.employee_id, "schedule window closed, sampling stopped");
                self.emit(Event::TrackingStopped {
                    employee_id: self.employee_id.clone(),
                    at,
                });
                SchedulePoll::StopSampling
            }
            _ => SchedulePoll::Unchanged,
        };
        Ok(poll)
    }

    /// Feed one position sample through matcher and state machine.
    ///
    /// Synchronous: the caller must not deliver the next sample until
    /// this returns. Returns the events emitted, if any.
    pub fn handle_sample(
        &mut self,
        sample: &Position,
        local_now: NaiveDateTime,
    ) -> Result<Vec<Event>> {
        if let Some(max) = self.config.tracking.max_accuracy_m {
            if sample.accuracy_m.map_or(false, |a| a > max) {
                debug!(
                    employee = %self.employee_id,
                    accuracy = ?sample.accuracy_m,
                    "discarding low-accuracy sample"
                );
                return Ok(Vec::new());
            }
        }

        if let Some(until) = self.backoff_until {
            if sample.captured_at < until {
                debug!(employee = %self.employee_id, until = %until, "in retry backoff, skipping sample");
                return Ok(Vec::new());
            }
        }

        let schedule_active = self.schedule.is_active_at(local_now);
        let contained = self.fences.matches(sample);

        match self
            .machine
            .observe(self.store.as_ref(), sample, &contained, schedule_active)
        {
            Ok(events) => {
                self.consecutive_failures = 0;
                self.backoff_until = None;
                self.last_error = None;
                for event in &events {
                    self.emit(event.clone());
                }
                Ok(events)
            }
            Err(e) => {
                // Transition not committed; same verdict is re-derived and
                // retried on the next sample after the backoff.
                self.consecutive_failures += 1;
                let delay = self.backoff_delay();
                self.backoff_until =
                    Some(sample.captured_at + chrono::Duration::from_std(delay).unwrap_or_default());
                self.last_error = Some(e.to_string());
                warn!(
                    employee = %self.employee_id,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "transition side effect failed, will retry"
                );
                self.emit(Event::StoreRetryScheduled {
                    employee_id: self.employee_id.clone(),
                    message: e.to_string(),
                    at: sample.captured_at,
                });
                Err(e)
            }
        }
    }

    /// Manual clock-in, valid regardless of schedule and geofence state.
    pub fn manual_clock_in(&mut self, site_id: &str) -> Result<Vec<Event>> {
        let events = self
            .machine
            .manual_clock_in(self.store.as_ref(), site_id, None, Utc::now())?;
        for event in &events {
            self.emit(event.clone());
        }
        Ok(events)
    }

    /// Manual clock-out. A no-op when not clocked in.
    pub fn manual_clock_out(&mut self) -> Result<Option<Event>> {
        let event = self.machine.manual_clock_out(self.store.as_ref(), Utc::now())?;
        if let Some(event) = &event {
            self.emit(event.clone());
        }
        Ok(event)
    }

    /// Terminal flush: close any open record and stop sampling. Used on
    /// logout/session stop; `run` calls it on shutdown.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(event) = self.machine.force_out(self.store.as_ref(), Utc::now())? {
            self.emit(event);
        }
        if self.sampling {
            self.sampling = false;
            self.emit(Event::TrackingStopped {
                employee_id: self.employee_id.clone(),
                at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Wall-clock tracking loop. Runs until `shutdown` flips to true.
    ///
    /// The schedule is re-evaluated on the configured cadence (clamped to
    /// 60 s). Samples are processed strictly one at a time; a transient
    /// store failure is logged and retried without leaving the loop.
    pub async fn run(
        &mut self,
        source: &dyn PositionSource,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let cadence = Duration::from_secs(self.config.tracking.poll_interval_secs.clamp(1, 60));
        let sample_timeout = Duration::from_secs(self.config.tracking.sample_timeout_secs.max(1));
        let mut ticker = tokio::time::interval(cadence);
        let mut subscription: Option<PositionSubscription> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_schedule(Local::now().naive_local()) {
                        Ok(SchedulePoll::StartSampling) => match source.subscribe() {
                            Ok(sub) => subscription = Some(sub),
                            Err(e) => {
                                // Location unavailable: retain status, retry
                                // on the next cycle. The started event from
                                // the poll gets a matching stop so the
                                // stream never shows a phantom session.
                                self.last_error = Some(e.to_string());
                                self.sampling = false;
                                warn!(employee = %self.employee_id, error = %e, "sampler start failed");
                                self.emit(Event::TrackingStopped {
                                    employee_id: self.employee_id.clone(),
                                    at: Utc::now(),
                                });
                            }
                        },
                        Ok(SchedulePoll::StopSampling) => {
                            if let Some(sub) = subscription.take() {
                                sub.stop();
                            }
                        }
                        Ok(SchedulePoll::Unchanged) => {}
                        Err(e) => {
                            self.last_error = Some(e.to_string());
                            warn!(employee = %self.employee_id, error = %e, "schedule poll failed");
                        }
                    }
                }
                sample = async {
                    match subscription.as_mut() {
                        Some(sub) => sub.next_timeout(sample_timeout).await,
                        None => Ok(None),
                    }
                }, if subscription.is_some() => {
                    match sample {
                        Ok(Some(position)) => {
                            if let Err(e) = self.handle_sample(&position, Local::now().naive_local()) {
                                debug!(employee = %self.employee_id, error = %e, "sample handling failed");
                            }
                        }
                        Ok(None) => {
                            // Source ended; the next schedule cycle may
                            // restart it.
                            subscription = None;
                            self.sampling = false;
                        }
                        Err(e) => {
                            // No fix within the timeout. Keep the
                            // subscription; positions may resume.
                            self.last_error = Some(e.to_string());
                            warn!(employee = %self.employee_id, error = %e, "location unavailable");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(sub) = subscription.take() {
            sub.stop();
        }
        self.stop()
    }

    fn backoff_delay(&self) -> Duration {
        let base = self.config.tracking.retry_backoff_base_secs.max(1);
        let cap = self.config.tracking.retry_backoff_cap_secs.max(base);
        let exp = self.consecutive_failures.saturating_sub(1).min(6);
        Duration::from_secs((base << exp).min(cap))
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine; the stream is best-effort.
        let _ = self.events.send(event);
    }
}
