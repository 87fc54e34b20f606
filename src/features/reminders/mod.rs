//! # Feature: Missed-Dose Reminders
//!
//! Detects scheduled doses that were not taken within the grace window and
//! raises one alert per dose per day for a monitoring caretaker.
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Caretaker-only monitoring, day rollover and event stream
//! - 1.0.0: Initial release

pub mod display;
pub mod engine;
pub mod events;
pub mod schedule;
pub mod scheduler;

pub use display::{format_missed_at, format_missed_notification, format_missed_summary, format_schedule_time};
pub use engine::{EvaluationReport, MissedDose, ReminderEngine, SessionToken};
pub use events::{ClearReason, ReminderEvent, EVENT_CHANNEL_CAPACITY};
pub use schedule::{dose_id, is_overdue, ScheduleTimeError, TimeOfDay};
pub use scheduler::ReminderScheduler;
