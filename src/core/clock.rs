//! # Wall Clock
//!
//! Local wall-clock source shared by the reminder engine and the in-memory
//! collaborators. All times are naive local times; there is no timezone handling.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use std::sync::{Arc, RwLock};

/// Source of the current local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Current local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Reads the host's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can hand one clone to the
/// engine and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        ManualClock {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Build a clock from `YYYY-MM-DD` and `HH:MM` strings
    pub fn at(date: &str, time: &str) -> anyhow::Result<Self> {
        let start = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M")?;
        Ok(Self::new(start))
    }

    pub fn set(&self, to: NaiveDateTime) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_manual_clock_parses_date_and_time() {
        let clock = ManualClock::at("2024-03-01", "09:20").unwrap();
        assert_eq!(clock.now().hour(), 9);
        assert_eq!(clock.now().minute(), 20);
        assert_eq!(clock.today().to_string(), "2024-03-01");
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::at("2024-03-01", "23:59").unwrap();
        let handle = clock.clone();

        handle.advance(Duration::minutes(2));

        assert_eq!(clock.today().to_string(), "2024-03-02");
        assert_eq!(clock.now().hour(), 0);
        assert_eq!(clock.now().minute(), 1);
    }

    #[test]
    fn test_manual_clock_rejects_bad_input() {
        assert!(ManualClock::at("2024-03-01", "9am").is_err());
    }
}
