//! # Configuration
//!
//! Environment-driven settings for the dosewatch binary. `.env` files are loaded
//! by the binary through dotenvy before `Config::from_env` runs.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

use crate::core::viewer::{Role, Viewer};
use anyhow::Result;
use log::warn;
use std::time::Duration;

/// Default grace window after a scheduled time before a dose counts as overdue
pub const DEFAULT_GRACE_MINUTES: u32 = 15;

/// Largest useful grace window; a full day means a dose is never overdue
pub const MAX_GRACE_MINUTES: u32 = 24 * 60;

/// Default cadence of the missed-dose evaluation loop
pub const DEFAULT_EVAL_INTERVAL_SECS: u64 = 60;

/// Upper bound for the day-rollover watchdog cadence
pub const MAX_DAY_WATCH_INTERVAL_SECS: u64 = 60;

/// Tunables shared by the reminder engine and its scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub grace_minutes: u32,
    pub evaluation_interval: Duration,
    pub day_watch_interval: Duration,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        ReminderSettings {
            grace_minutes: DEFAULT_GRACE_MINUTES,
            evaluation_interval: Duration::from_secs(DEFAULT_EVAL_INTERVAL_SECS),
            day_watch_interval: Duration::from_secs(MAX_DAY_WATCH_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub schedule_path: String,
    pub reminders: ReminderSettings,
    /// Identity the binary monitors as; `None` leaves the engine idle
    pub viewer_id: Option<String>,
    pub viewer_role: Role,
    pub patient_id: Option<String>,
}

impl Config {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let viewer_role = match get("DOSEWATCH_VIEWER_ROLE") {
            Some(raw) => raw.parse::<Role>()?,
            None => Role::Caretaker,
        };

        let day_watch_secs = parse_or_default(
            "DOSEWATCH_DAY_WATCH_INTERVAL_SECS",
            get("DOSEWATCH_DAY_WATCH_INTERVAL_SECS"),
            MAX_DAY_WATCH_INTERVAL_SECS,
        );
        if day_watch_secs > MAX_DAY_WATCH_INTERVAL_SECS {
            warn!(
                "DOSEWATCH_DAY_WATCH_INTERVAL_SECS={} exceeds {}s, clamping",
                day_watch_secs, MAX_DAY_WATCH_INTERVAL_SECS
            );
        }

        let grace_minutes = parse_or_default(
            "DOSEWATCH_GRACE_MINUTES",
            get("DOSEWATCH_GRACE_MINUTES"),
            DEFAULT_GRACE_MINUTES,
        );
        if grace_minutes > MAX_GRACE_MINUTES {
            warn!(
                "DOSEWATCH_GRACE_MINUTES={} exceeds {} minutes, clamping",
                grace_minutes, MAX_GRACE_MINUTES
            );
        }

        let reminders = ReminderSettings {
            grace_minutes: grace_minutes.min(MAX_GRACE_MINUTES),
            evaluation_interval: Duration::from_secs(
                parse_or_default(
                    "DOSEWATCH_EVAL_INTERVAL_SECS",
                    get("DOSEWATCH_EVAL_INTERVAL_SECS"),
                    DEFAULT_EVAL_INTERVAL_SECS,
                )
                .max(1),
            ),
            day_watch_interval: Duration::from_secs(
                day_watch_secs.clamp(1, MAX_DAY_WATCH_INTERVAL_SECS),
            ),
        };

        Ok(Config {
            log_level: get("DOSEWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            schedule_path: get("DOSEWATCH_SCHEDULE_PATH")
                .unwrap_or_else(|| "schedule.yaml".to_string()),
            reminders,
            viewer_id: get("DOSEWATCH_VIEWER_ID"),
            viewer_role,
            patient_id: get("DOSEWATCH_PATIENT_ID"),
        })
    }

    /// The configured viewer, if an identity was provided.
    ///
    /// The monitored patient defaults to the viewer's own id.
    pub fn viewer(&self) -> Option<Viewer> {
        let user_id = self.viewer_id.clone()?;
        let patient_id = self.patient_id.clone().unwrap_or_else(|| user_id.clone());
        Some(Viewer::new(user_id, self.viewer_role, patient_id))
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match raw {
        Some(value) => value.parse::<T>().unwrap_or_else(|_| {
            warn!("Invalid value for {}: '{}', using default {}", key, value, default);
            default
        }),
        None => default,
    }
}
