//! Human-readable formatting for missed-dose alerts.

use crate::features::reminders::engine::MissedDose;
use crate::features::reminders::schedule::TimeOfDay;
use chrono::{NaiveDateTime, Timelike};

/// Notification text for a newly detected missed dose
pub fn format_missed_notification(missed: &MissedDose) -> String {
    format!(
        "Patient missed {} ({}) at {}",
        missed.medication.name, missed.medication.dosage, missed.scheduled_time
    )
}

/// 12-hour rendering of a scheduled `HH:MM`, e.g. `21:05` -> `9:05 PM`.
///
/// Unparseable input is returned unchanged.
pub fn format_schedule_time(scheduled_time: &str) -> String {
    match scheduled_time.parse::<TimeOfDay>() {
        Ok(time) => twelve_hour(time.hour(), time.minute()),
        Err(_) => scheduled_time.to_string(),
    }
}

/// 12-hour rendering of when a dose was classified as missed
pub fn format_missed_at(missed_at: &NaiveDateTime) -> String {
    twelve_hour(missed_at.hour(), missed_at.minute())
}

fn twelve_hour(hour: u32, minute: u32) -> String {
    let suffix = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", display_hour, minute, suffix)
}

/// One-line summary used in logs and the CLI
pub fn format_missed_summary(missed: &MissedDose) -> String {
    format!(
        "{} {} - scheduled {}, missed at {}",
        missed.medication.name,
        missed.medication.dosage,
        format_schedule_time(&missed.scheduled_time),
        format_missed_at(&missed.missed_at)
    )
}
