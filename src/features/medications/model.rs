//! Medication domain types shared by the registry, the taken log and the
//! reminder engine.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[default]
    Daily,
    TwiceDaily,
    ThriceDaily,
    Weekly,
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::TwiceDaily => "twice-daily",
            Frequency::ThriceDaily => "thrice-daily",
            Frequency::Weekly => "weekly",
            Frequency::Custom => "custom",
        }
    }
}

/// A medication on a patient's schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: Frequency,
    /// Scheduled local times of day, `HH:MM`, in schedule order
    pub time_of_day: Vec<String>,
    /// Owning patient
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_active: bool,
}

/// Fields a caller supplies when adding or editing a medication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: Frequency,
    pub time_of_day: Vec<String>,
}

/// A single "dose taken" entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseTaken {
    pub id: String,
    pub medication_id: String,
    pub user_id: String,
    pub taken_at: NaiveDateTime,
    /// Local calendar day the dose counts towards
    pub date: NaiveDate,
}
