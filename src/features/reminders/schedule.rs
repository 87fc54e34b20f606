//! Time-of-day parsing and the overdue policy.

use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// Why a scheduled `HH:MM` string could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleTimeError {
    /// Not of the shape `HH:MM`
    #[error("malformed time of day '{0}'")]
    Format(String),
    /// Well-formed but hour or minute out of range
    #[error("time of day out of range '{0}'")]
    OutOfRange(String),
}

/// A local wall-clock time with minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(TimeOfDay { hour, minute })
    }

    /// Truncates seconds away
    pub fn from_datetime(at: &NaiveDateTime) -> Self {
        TimeOfDay {
            hour: at.hour(),
            minute: at.minute(),
        }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleTimeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let format_err = || ScheduleTimeError::Format(raw.to_string());

        let (hour, minute) = raw.split_once(':').ok_or_else(format_err)?;
        let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(hour) || hour.len() != 2 || !all_digits(minute) || minute.len() != 2 {
            return Err(format_err());
        }

        let hour: u32 = hour.parse().map_err(|_| format_err())?;
        let minute: u32 = minute.parse().map_err(|_| format_err())?;
        TimeOfDay::new(hour, minute).ok_or_else(|| ScheduleTimeError::OutOfRange(raw.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Deterministic id of a scheduled dose: `{medication_id}-{scheduled_time}`
pub fn dose_id(medication_id: &str, scheduled_time: &str) -> String {
    format!("{}-{}", medication_id, scheduled_time)
}

/// A dose is overdue strictly after its grace window has elapsed.
///
/// No wraparound: a scheduled time later in the day than `now` is never overdue.
pub fn is_overdue(now: TimeOfDay, scheduled: TimeOfDay, grace_minutes: u32) -> bool {
    now.minutes_of_day() > scheduled.minutes_of_day().saturating_add(grace_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> TimeOfDay {
        raw.parse().unwrap()
    }

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(t("09:00").minutes_of_day(), 540);
        assert_eq!(t("09:05").minutes_of_day(), 545);
        assert_eq!(t("23:59").minutes_of_day(), 1439);
        assert_eq!(t("00:00").minutes_of_day(), 0);
    }

    #[test]
    fn test_parse_malformed() {
        for raw in ["morning", "9:05", " 09:00", "0900", "09:0", "09:000", "-1:00", "09:xx", "", ":30", "123:00"] {
            assert!(
                matches!(raw.parse::<TimeOfDay>(), Err(ScheduleTimeError::Format(_))),
                "expected format error for {raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_out_of_range() {
        assert_eq!(
            "24:00".parse::<TimeOfDay>(),
            Err(ScheduleTimeError::OutOfRange("24:00".to_string()))
        );
        assert!(matches!(
            "12:60".parse::<TimeOfDay>(),
            Err(ScheduleTimeError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_grace_boundary_is_strict() {
        assert!(!is_overdue(t("09:15"), t("09:00"), 15));
        assert!(is_overdue(t("09:16"), t("09:00"), 15));
    }

    #[test]
    fn test_huge_grace_never_overdue() {
        assert!(!is_overdue(t("23:59"), t("00:00"), u32::MAX));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            "noon".parse::<TimeOfDay>().unwrap_err().to_string(),
            "malformed time of day 'noon'"
        );
        assert_eq!(
            "25:00".parse::<TimeOfDay>().unwrap_err().to_string(),
            "time of day out of range '25:00'"
        );
    }

    #[test]
    fn test_no_wraparound() {
        // 23:50 dose is never overdue at 00:10 the next morning
        assert!(!is_overdue(t("00:10"), t("23:50"), 15));
        assert!(!is_overdue(t("08:00"), t("09:00"), 15));
    }

    #[test]
    fn test_from_datetime_truncates_seconds() {
        let at = NaiveDateTime::parse_from_str("2024-03-01 09:15:59", "%Y-%m-%d %H:%M:%S").unwrap();
        let now = TimeOfDay::from_datetime(&at);
        assert_eq!(now.to_string(), "09:15");
        assert!(!is_overdue(now, t("09:00"), 15));
    }

    #[test]
    fn test_dose_id() {
        assert_eq!(dose_id("m1", "09:00"), "m1-09:00");
    }
}
