//! # Schedule File
//!
//! YAML description of a patient's medication schedule, used to seed the
//! in-memory registry and taken log.
//!
//! ```yaml
//! patient_id: patient-1
//! medications:
//!   - id: m1
//!     name: Aspirin
//!     dosage: 100mg
//!     frequency: daily
//!     time_of_day: ["09:00"]
//!     taken_today: false
//! ```

use crate::features::medications::model::{Frequency, MedicationDraft};
use crate::features::medications::registry::MedicationRegistry;
use crate::features::medications::taken::TakenLog;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

const TIME_OF_DAY_PATTERN: &str = r"^([01][0-9]|2[0-3]):[0-5][0-9]$";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleFile {
    pub patient_id: String,
    #[serde(default)]
    pub medications: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleEntry {
    /// Stable id; generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: Frequency,
    pub time_of_day: Vec<String>,
    /// Seed a "taken" entry for today when loading
    #[serde(default)]
    pub taken_today: bool,
}

impl ScheduleFile {
    /// Load and validate a schedule from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let schedule: ScheduleFile = serde_yaml::from_str(contents)?;
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.patient_id.trim().is_empty() {
            return Err(anyhow::anyhow!("Schedule has an empty patient_id"));
        }

        let time_format = Regex::new(TIME_OF_DAY_PATTERN)?;
        for entry in &self.medications {
            if entry.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Medication with empty name in schedule"));
            }
            if entry.dosage.trim().is_empty() {
                return Err(anyhow::anyhow!("Medication {} has no dosage", entry.name));
            }
            if entry.time_of_day.is_empty() {
                return Err(anyhow::anyhow!(
                    "Medication {} has no scheduled times",
                    entry.name
                ));
            }
            for time in &entry.time_of_day {
                if !time_format.is_match(time) {
                    return Err(anyhow::anyhow!(
                        "Invalid time '{}' for medication {} (expected HH:MM)",
                        time,
                        entry.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Register every medication and seed today's taken entries.
    ///
    /// Returns the medication ids in file order.
    pub fn seed(&self, registry: &MedicationRegistry, taken: &TakenLog) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.medications.len());
        for entry in &self.medications {
            let draft = MedicationDraft {
                name: entry.name.clone(),
                dosage: entry.dosage.clone(),
                frequency: entry.frequency,
                time_of_day: entry.time_of_day.clone(),
            };
            let id = match &entry.id {
                Some(id) => registry.add_with_id(id.clone(), draft, &self.patient_id),
                None => registry.add(draft, &self.patient_id),
            };
            if entry.taken_today {
                taken.mark_taken(&id, &self.patient_id);
            }
            ids.push(id);
        }
        ids
    }
}
