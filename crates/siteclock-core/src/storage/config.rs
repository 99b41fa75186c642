//! TOML-based application configuration.
//!
//! Stores tracking cadence, sampling tolerances and the default weekly
//! schedule applied to employees without a stored one. The defaults are an
//! explicit configuration value injected at construction, never inline
//! literals at call sites.
//!
//! Configuration is stored at `~/.config/siteclock/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ScheduleError;
use crate::schedule::{parse_hhmm, weekday_from_index, DayWindow, TrackingSchedule};

/// Tracking loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Schedule re-evaluation cadence in seconds. Clamped to 60 at use
    /// sites; the schedule must be re-checked at least once per minute.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// How long to wait for a position before treating location as
    /// unavailable.
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_secs: u64,
    /// Samples with worse reported accuracy than this are discarded.
    /// `None` accepts every sample.
    #[serde(default)]
    pub max_accuracy_m: Option<f64>,
    /// Base delay before retrying a failed store write.
    #[serde(default = "default_backoff_base")]
    pub retry_backoff_base_secs: u64,
    /// Upper bound on the store retry delay.
    #[serde(default = "default_backoff_cap")]
    pub retry_backoff_cap_secs: u64,
}

/// Default weekly schedule for employees with no stored schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefaults {
    /// Enabled weekdays, 0 = Monday .. 6 = Sunday.
    #[serde(default = "default_weekdays")]
    pub enabled_days: Vec<u8>,
    /// Window start, "HH:MM".
    #[serde(default = "default_start")]
    pub start: String,
    /// Window end, "HH:MM".
    #[serde(default = "default_end")]
    pub end: String,
}

impl ScheduleDefaults {
    /// Materialize the defaults as a weekly schedule.
    ///
    /// # Errors
    /// Returns an error if the time strings do not parse, a day index is
    /// out of range, or the window is inverted.
    pub fn to_schedule(&self) -> Result<TrackingSchedule, ScheduleError> {
        let start = parse_hhmm(&self.start)?;
        let end = parse_hhmm(&self.end)?;
        let mut schedule = TrackingSchedule::all_disabled();
        for &day in &self.enabled_days {
            schedule.set_window(weekday_from_index(day)?, DayWindow::enabled(start, end));
        }
        schedule.validate()?;
        Ok(schedule)
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/siteclock/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub default_schedule: ScheduleDefaults,
}

// Default functions
fn default_poll_interval() -> u64 {
    60
}
fn default_sample_timeout() -> u64 {
    30
}
fn default_backoff_base() -> u64 {
    5
}
fn default_backoff_cap() -> u64 {
    60
}
fn default_weekdays() -> Vec<u8> {
    vec![0, 1, 2, 3, 4] // Monday through Friday
}
fn default_start() -> String {
    "09:00".into()
}
fn default_end() -> String {
    "17:00".into()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            sample_timeout_secs: default_sample_timeout(),
            max_accuracy_m: None,
            retry_backoff_base_secs: default_backoff_base(),
            retry_backoff_cap_secs: default_backoff_cap(),
        }
    }
}

impl Default for ScheduleDefaults {
    fn default() -> Self {
        Self {
            enabled_days: default_weekdays(),
            start: default_start(),
            end: default_end(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| format!("cannot parse '{value}' as number"))?
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }

    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
