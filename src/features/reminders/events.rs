//! Events published by the reminder engine to in-process observers.

use crate::features::reminders::engine::MissedDose;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Broadcast channel capacity for reminder events
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why the whole alert state was emptied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearReason {
    Manual,
    DayRollover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReminderEvent {
    /// A dose was newly classified as missed
    DoseMissed { record: MissedDose, message: String },
    /// A single missed-dose record was dismissed
    MissedDoseCleared { id: String },
    /// A notification was dismissed by position
    NotificationCleared { index: usize },
    /// Records, notifications and the seen set were emptied
    AllCleared { reason: ClearReason, date: NaiveDate },
}
