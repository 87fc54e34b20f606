//! # Medications Feature
//!
//! Medication model, the collaborator seams the reminder engine consumes, and
//! in-memory implementations of both.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: YAML schedule files and `pending_today`
//! - 1.0.0: Registry, taken log and source/oracle traits

pub mod model;
pub mod registry;
pub mod schedule_file;
pub mod taken;

pub use model::{DoseTaken, Frequency, Medication, MedicationDraft};
pub use registry::MedicationRegistry;
pub use schedule_file::{ScheduleEntry, ScheduleFile};
pub use taken::TakenLog;

use anyhow::Result;
use async_trait::async_trait;
use log::warn;

/// Provides the active medications of the monitored patient
#[async_trait]
pub trait MedicationSource: Send + Sync {
    async fn active_medications_for(&self, patient_id: &str) -> Result<Vec<Medication>>;
}

/// Answers whether a medication was recorded as taken today
#[async_trait]
pub trait TakenStatusOracle: Send + Sync {
    async fn was_taken_today(&self, medication_id: &str, user_id: &str) -> Result<bool>;
}

/// Active medications with no dose recorded today.
///
/// Oracle failures count as "not taken" so a flaky lookup never hides a dose.
pub async fn pending_today(
    source: &dyn MedicationSource,
    oracle: &dyn TakenStatusOracle,
    patient_id: &str,
) -> Result<Vec<Medication>> {
    let mut pending = Vec::new();
    for medication in source.active_medications_for(patient_id).await? {
        let taken = match oracle.was_taken_today(&medication.id, patient_id).await {
            Ok(taken) => taken,
            Err(e) => {
                warn!(
                    "Taken-status lookup failed for {} ({}): {}",
                    medication.name, medication.id, e
                );
                false
            }
        };
        if !taken {
            pending.push(medication);
        }
    }
    Ok(pending)
}
