//! # Features
//!
//! Medication tracking and the missed-dose reminder engine built on top of it.

pub mod medications;
pub mod reminders;

pub use medications::{
    pending_today, DoseTaken, Frequency, Medication, MedicationDraft, MedicationRegistry,
    MedicationSource, ScheduleEntry, ScheduleFile, TakenLog, TakenStatusOracle,
};
pub use reminders::{
    ClearReason, EvaluationReport, MissedDose, ReminderEngine, ReminderEvent, ReminderScheduler,
};
