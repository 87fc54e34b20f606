//! # Medication Registry
//!
//! In-memory medication store backing the `MedicationSource` seam. Deletion is
//! a soft delete: deactivated medications stay in the map but are no longer
//! reported as active.

use crate::core::clock::Clock;
use crate::features::medications::model::{Medication, MedicationDraft};
use crate::features::medications::MedicationSource;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct MedicationRegistry {
    medications: Arc<DashMap<String, Medication>>,
    clock: Arc<dyn Clock>,
    changes: broadcast::Sender<String>,
}

impl MedicationRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MedicationRegistry {
            medications: Arc::new(DashMap::new()),
            clock,
            changes,
        }
    }

    /// Ids of medications as they are added, edited or deactivated
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    fn notify_changed(&self, medication_id: &str) {
        let _ = self.changes.send(medication_id.to_string());
    }

    /// Add a medication for a patient and return its generated id
    pub fn add(&self, draft: MedicationDraft, user_id: &str) -> String {
        self.add_with_id(Uuid::new_v4().to_string(), draft, user_id)
    }

    /// Add a medication under a caller-chosen id, replacing any existing entry
    pub fn add_with_id(&self, id: String, draft: MedicationDraft, user_id: &str) -> String {
        let now = self.clock.now();
        let medication = Medication {
            id: id.clone(),
            name: draft.name,
            dosage: draft.dosage,
            frequency: draft.frequency,
            time_of_day: draft.time_of_day,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        };
        info!(
            "Added medication {} ({}) for user {}",
            medication.name, id, user_id
        );
        self.medications.insert(id.clone(), medication);
        self.notify_changed(&id);
        id
    }

    /// Insert a fully-formed medication, replacing any entry with the same id
    pub fn insert(&self, medication: Medication) {
        let id = medication.id.clone();
        self.medications.insert(id.clone(), medication);
        self.notify_changed(&id);
    }

    /// Replace the editable fields of an existing medication
    pub fn update(&self, medication_id: &str, draft: MedicationDraft) -> Result<()> {
        let mut entry = self
            .medications
            .get_mut(medication_id)
            .ok_or_else(|| anyhow::anyhow!("Medication not found: {}", medication_id))?;

        entry.name = draft.name;
        entry.dosage = draft.dosage;
        entry.frequency = draft.frequency;
        entry.time_of_day = draft.time_of_day;
        entry.updated_at = self.clock.now();
        drop(entry);
        debug!("Updated medication {}", medication_id);
        self.notify_changed(medication_id);
        Ok(())
    }

    /// Soft-delete a medication
    pub fn deactivate(&self, medication_id: &str) -> Result<()> {
        let mut entry = self
            .medications
            .get_mut(medication_id)
            .ok_or_else(|| anyhow::anyhow!("Medication not found: {}", medication_id))?;

        entry.is_active = false;
        entry.updated_at = self.clock.now();
        drop(entry);
        info!("Deactivated medication {}", medication_id);
        self.notify_changed(medication_id);
        Ok(())
    }

    pub fn get(&self, medication_id: &str) -> Option<Medication> {
        self.medications.get(medication_id).map(|m| m.value().clone())
    }

    /// Active medications for a patient, newest first
    pub fn active_for(&self, user_id: &str) -> Vec<Medication> {
        let mut active: Vec<Medication> = self
            .medications
            .iter()
            .filter(|m| m.is_active && m.user_id == user_id)
            .map(|m| m.value().clone())
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }
}

#[async_trait]
impl MedicationSource for MedicationRegistry {
    async fn active_medications_for(&self, patient_id: &str) -> Result<Vec<Medication>> {
        Ok(self.active_for(patient_id))
    }
}
