// Core layer - config, clock and viewer identity
pub mod core;

// Features layer - medications and missed-dose reminders
pub mod features;

pub use crate::core::{Clock, Config, ManualClock, ReminderSettings, Role, SystemClock, Viewer};

pub use features::{
    // Medications
    pending_today, DoseTaken, Frequency, Medication, MedicationDraft, MedicationRegistry,
    MedicationSource, ScheduleFile, TakenLog, TakenStatusOracle,
    // Reminders
    ClearReason, EvaluationReport, MissedDose, ReminderEngine, ReminderEvent, ReminderScheduler,
};
