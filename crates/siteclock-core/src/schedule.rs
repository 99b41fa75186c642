//! Weekly tracking schedules and the schedule evaluator.
//!
//! A schedule defines when automatic tracking is *authorized*, independent
//! of assignment dates. Evaluation is stateless and side-effect free; the
//! controller re-evaluates at least once per minute.
//!
//! Windows crossing midnight are unsupported and rejected by validation.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Authorized tracking window for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayWindow {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn enabled(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            enabled: true,
            start,
            end,
        }
    }

    /// Whether `time` falls in `[start, end)`. The start instant is
    /// active, the end instant is not.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.enabled && time >= self.start && time < self.end
    }
}

/// Per-employee weekly tracking schedule: one window per weekday,
/// indexed from Monday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSchedule {
    pub days: [DayWindow; 7],
}

impl TrackingSchedule {
    /// A schedule with every day disabled.
    pub fn all_disabled() -> Self {
        Self {
            days: [DayWindow::disabled(); 7],
        }
    }

    /// The same window on every weekday.
    pub fn uniform(window: DayWindow) -> Self {
        Self { days: [window; 7] }
    }

    pub fn window_for(&self, day: Weekday) -> &DayWindow {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn set_window(&mut self, day: Weekday, window: DayWindow) {
        self.days[day.num_days_from_monday() as usize] = window;
    }

    /// Whether tracking is authorized at `local_now`, expressed in the
    /// employee's local time.
    pub fn is_active_at(&self, local_now: NaiveDateTime) -> bool {
        self.window_for(local_now.weekday()).contains(local_now.time())
    }

    /// Reject windows where start is not strictly before end. Disabled
    /// days are not checked.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for (i, window) in self.days.iter().enumerate() {
            if window.enabled && window.start >= window.end {
                return Err(ScheduleError::InvalidWindow {
                    day: weekday_name(i),
                    start: window.start,
                    end: window.end,
                });
            }
        }
        Ok(())
    }
}

fn weekday_name(index: usize) -> String {
    const NAMES: [&str; 7] = [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ];
    NAMES.get(index).copied().unwrap_or("?").to_string()
}

/// Parse an "HH:MM" string into a `NaiveTime`.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| ScheduleError::ParseTime(s.to_string()))
}

/// Weekday from index 0 = Monday .. 6 = Sunday.
pub fn weekday_from_index(index: u8) -> Result<Weekday, ScheduleError> {
    match index {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(ScheduleError::BadWeekday(other)),
    }
}
