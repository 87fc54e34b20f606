//! # Taken Log
//!
//! In-memory record of doses marked as taken, keyed by local calendar day.
//! Backs the `TakenStatusOracle` seam.

use crate::core::clock::Clock;
use crate::features::medications::model::DoseTaken;
use crate::features::medications::TakenStatusOracle;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

/// (medication_id, user_id, local date)
type TakenKey = (String, String, NaiveDate);

#[derive(Clone)]
pub struct TakenLog {
    entries: Arc<DashMap<TakenKey, Vec<DoseTaken>>>,
    clock: Arc<dyn Clock>,
}

impl TakenLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        TakenLog {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Record a dose as taken now and return the entry id
    pub fn mark_taken(&self, medication_id: &str, user_id: &str) -> String {
        let taken_at = self.clock.now();
        let entry = DoseTaken {
            id: Uuid::new_v4().to_string(),
            medication_id: medication_id.to_string(),
            user_id: user_id.to_string(),
            taken_at,
            date: taken_at.date(),
        };
        let id = entry.id.clone();

        info!(
            "Dose of {} marked taken by {} at {}",
            medication_id,
            user_id,
            taken_at.format("%H:%M")
        );
        self.entries
            .entry((medication_id.to_string(), user_id.to_string(), entry.date))
            .or_default()
            .push(entry);
        id
    }

    /// Whether any dose of the medication was recorded for the given day
    pub fn was_taken_on(&self, medication_id: &str, user_id: &str, date: NaiveDate) -> bool {
        self.entries
            .get(&(medication_id.to_string(), user_id.to_string(), date))
            .map(|e| !e.is_empty())
            .unwrap_or(false)
    }

    /// All entries recorded for a day, oldest first
    pub fn entries_on(&self, date: NaiveDate) -> Vec<DoseTaken> {
        let mut found: Vec<DoseTaken> = self
            .entries
            .iter()
            .filter(|e| e.key().2 == date)
            .flat_map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        found
    }
}

#[async_trait]
impl TakenStatusOracle for TakenLog {
    async fn was_taken_today(&self, medication_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.was_taken_on(medication_id, user_id, self.clock.today()))
    }
}
