//! # Feature: Missed-Dose Engine
//!
//! Cross-references a patient's active medications against their taken-status
//! for today and raises one alert per overdue, untaken dose. Alerts are
//! de-duplicated per local day and wiped when the day rolls over.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Claim dose ids before querying taken-status; results from a
//!   revoked epoch are dropped instead of committed
//! - 1.1.0: Broadcast `ReminderEvent`s to subscribers
//! - 1.0.0: Initial release with grace-window detection and day rollover

use crate::core::clock::Clock;
use crate::core::config::DEFAULT_GRACE_MINUTES;
use crate::core::viewer::Viewer;
use crate::features::medications::{Medication, MedicationSource, TakenStatusOracle};
use crate::features::reminders::display::{format_missed_notification, format_missed_summary};
use crate::features::reminders::events::{ClearReason, ReminderEvent, EVENT_CHANNEL_CAPACITY};
use crate::features::reminders::schedule::{dose_id, is_overdue, TimeOfDay};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// A scheduled dose that passed its grace window without being taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedDose {
    /// `{medication_id}-{scheduled_time}`
    pub id: String,
    /// Medication as it looked when the miss was detected
    pub medication: Medication,
    pub scheduled_time: String,
    pub missed_at: NaiveDateTime,
}

/// What a single evaluation pass saw and did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// False when the viewer was not allowed to monitor
    pub active: bool,
    /// Scheduled doses looked at
    pub checked: usize,
    /// Doses past their grace window, seen or not
    pub overdue: usize,
    /// Scheduled times that could not be parsed
    pub malformed: usize,
    /// Taken-status lookups that failed
    pub failed: usize,
    /// Results were dropped because state was reset mid-evaluation
    pub discarded: bool,
    pub newly_missed: Vec<MissedDose>,
}

impl EvaluationReport {
    fn inactive() -> Self {
        Self::default()
    }
}

/// Cancellation marker for one monitoring session.
///
/// Once cancelled through [`ReminderEngine::cancel_session`], evaluations run
/// under the token claim nothing more and commit nothing.
#[derive(Debug, Default)]
pub struct SessionToken {
    cancelled: AtomicBool,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Slot {
    seq: u64,
    record: MissedDose,
}

struct ReminderState {
    /// Committed missed doses; keys are the committed part of the seen set
    missed: HashMap<String, Slot>,
    next_seq: u64,
    notifications: Vec<String>,
    /// Dose ids claimed by in-flight evaluations, tagged with the claiming epoch
    claimed: HashMap<String, u64>,
    /// Bumped whenever in-flight work must be abandoned
    epoch: u64,
    /// Local day the current alerts belong to
    day: NaiveDate,
}

impl ReminderState {
    fn new(day: NaiveDate) -> Self {
        ReminderState {
            missed: HashMap::new(),
            next_seq: 0,
            notifications: Vec::new(),
            claimed: HashMap::new(),
            epoch: 0,
            day,
        }
    }

    fn is_seen(&self, id: &str) -> bool {
        self.missed.contains_key(id) || self.claimed.contains_key(id)
    }

    fn reset(&mut self, day: NaiveDate) {
        self.missed.clear();
        self.notifications.clear();
        self.claimed.clear();
        self.epoch += 1;
        self.day = day;
    }
}

pub struct ReminderEngine {
    source: Arc<dyn MedicationSource>,
    oracle: Arc<dyn TakenStatusOracle>,
    clock: Arc<dyn Clock>,
    grace_minutes: u32,
    state: Mutex<ReminderState>,
    events: broadcast::Sender<ReminderEvent>,
}

impl ReminderEngine {
    pub fn new(
        source: Arc<dyn MedicationSource>,
        oracle: Arc<dyn TakenStatusOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let today = clock.today();
        ReminderEngine {
            source,
            oracle,
            clock,
            grace_minutes: DEFAULT_GRACE_MINUTES,
            state: Mutex::new(ReminderState::new(today)),
            events,
        }
    }

    pub fn with_grace_minutes(mut self, grace_minutes: u32) -> Self {
        self.grace_minutes = grace_minutes;
        self
    }

    pub fn grace_minutes(&self) -> u32 {
        self.grace_minutes
    }

    /// Receive engine events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderEvent> {
        self.events.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, ReminderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: ReminderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Run one detection pass for the viewer's patient.
    ///
    /// Non-caretaker viewers get an inactive report with no queries made and no
    /// state touched.
    pub async fn evaluate(&self, viewer: &Viewer) -> EvaluationReport {
        self.evaluate_in_session(viewer, &SessionToken::new()).await
    }

    /// Like [`evaluate`](Self::evaluate), but bound to a monitoring session
    pub async fn evaluate_in_session(
        &self,
        viewer: &Viewer,
        session: &SessionToken,
    ) -> EvaluationReport {
        if session.is_cancelled() {
            return EvaluationReport::inactive();
        }
        if !viewer.can_monitor() {
            debug!(
                "Skipping missed-dose check: viewer '{}' ({}) cannot monitor",
                viewer.user_id, viewer.role
            );
            return EvaluationReport::inactive();
        }

        // Alerts never outlive their day, even if the watchdog is late
        self.check_day_rollover();

        let now = self.clock.now();
        let current = TimeOfDay::from_datetime(&now);
        let mut report = EvaluationReport {
            active: true,
            ..EvaluationReport::default()
        };

        let mut claims = DoseClaims::new(self, session);

        let medications = match self.source.active_medications_for(&viewer.patient_id).await {
            Ok(medications) => medications,
            Err(e) => {
                warn!(
                    "Failed to load medications for patient {}: {}",
                    viewer.patient_id, e
                );
                return report;
            }
        };

        let mut found = Vec::new();
        for medication in &medications {
            for scheduled_time in &medication.time_of_day {
                report.checked += 1;
                let id = dose_id(&medication.id, scheduled_time);

                let scheduled = match scheduled_time.parse::<TimeOfDay>() {
                    Ok(scheduled) => scheduled,
                    Err(e) => {
                        warn!("Skipping dose {} of {}: {}", id, medication.name, e);
                        report.malformed += 1;
                        continue;
                    }
                };

                if !is_overdue(current, scheduled, self.grace_minutes) {
                    continue;
                }
                report.overdue += 1;

                // Claim before the lookup so overlapping passes never query the same dose twice
                if !claims.try_claim(&id) {
                    continue;
                }

                match self
                    .oracle
                    .was_taken_today(&medication.id, &viewer.patient_id)
                    .await
                {
                    Ok(true) => claims.release(&id),
                    Ok(false) => found.push(MissedDose {
                        id,
                        medication: medication.clone(),
                        scheduled_time: scheduled_time.clone(),
                        missed_at: now,
                    }),
                    Err(e) => {
                        warn!(
                            "Taken-status lookup failed for {} ({}), will retry next tick: {}",
                            medication.name, id, e
                        );
                        report.failed += 1;
                        claims.release(&id);
                    }
                }
            }
        }

        match claims.commit(found) {
            Some(committed) => {
                for (record, message) in &committed {
                    info!("⚠️ Missed dose detected: {}", format_missed_summary(record));
                    self.publish(ReminderEvent::DoseMissed {
                        record: record.clone(),
                        message: message.clone(),
                    });
                }
                report.newly_missed = committed.into_iter().map(|(record, _)| record).collect();
            }
            None => {
                debug!("Discarding evaluation results: session ended or alerts reset mid-evaluation");
                report.discarded = true;
            }
        }

        report
    }

    /// Missed doses in detection order
    pub fn missed_doses(&self) -> Vec<MissedDose> {
        let state = self.lock_state();
        let mut slots: Vec<&Slot> = state.missed.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.record.clone()).collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.lock_state().notifications.clone()
    }

    /// Whether a dose id is currently suppressed from re-detection
    pub fn is_seen(&self, id: &str) -> bool {
        self.lock_state().is_seen(id)
    }

    /// Dismiss one missed dose; it may be detected again on a later pass.
    ///
    /// Notifications are left alone.
    pub fn clear_missed_dose(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.lock_state();
            state.claimed.remove(id);
            state.missed.remove(id).is_some()
        };

        if removed {
            debug!("Cleared missed dose {}", id);
            self.publish(ReminderEvent::MissedDoseCleared { id: id.to_string() });
        }
        removed
    }

    /// Dismiss the notification at `index`; out-of-range indices are ignored
    pub fn clear_notification(&self, index: usize) -> bool {
        let removed = {
            let mut state = self.lock_state();
            if index < state.notifications.len() {
                state.notifications.remove(index);
                true
            } else {
                false
            }
        };

        if removed {
            self.publish(ReminderEvent::NotificationCleared { index });
        }
        removed
    }

    /// Empty missed doses, notifications and the seen set in one step
    pub fn clear_all(&self) {
        let today = self.clock.today();
        self.lock_state().reset(today);
        info!("Cleared all missed-dose alerts");
        self.publish(ReminderEvent::AllCleared {
            reason: ClearReason::Manual,
            date: today,
        });
    }

    /// Reset all alert state once per local midnight crossing.
    ///
    /// Returns true when this call performed the reset.
    pub fn check_day_rollover(&self) -> bool {
        let today = self.clock.today();
        let previous = {
            let mut state = self.lock_state();
            if today <= state.day {
                return false;
            }
            let previous = state.day;
            state.reset(today);
            previous
        };

        info!("🌅 New day {} (was {}), missed-dose alerts reset", today, previous);
        self.publish(ReminderEvent::AllCleared {
            reason: ClearReason::DayRollover,
            date: today,
        });
        true
    }

    /// End a monitoring session. Evaluations bound to it that are still in
    /// flight will not commit; committed alerts are kept.
    pub fn cancel_session(&self, session: &SessionToken) {
        // Flipped under the state lock so no commit can straddle the cancellation
        let _state = self.lock_state();
        session.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Dose ids claimed by one evaluation pass.
///
/// Claims that are neither committed nor released are dropped with the pass,
/// so an evaluation future dropped mid-lookup leaves no stale seen entries.
struct DoseClaims<'a> {
    engine: &'a ReminderEngine,
    session: &'a SessionToken,
    epoch: u64,
    ids: Vec<String>,
}

impl<'a> DoseClaims<'a> {
    fn new(engine: &'a ReminderEngine, session: &'a SessionToken) -> Self {
        let epoch = engine.lock_state().epoch;
        DoseClaims {
            engine,
            session,
            epoch,
            ids: Vec::new(),
        }
    }

    fn is_stale(&self, state: &ReminderState) -> bool {
        state.epoch != self.epoch || self.session.is_cancelled()
    }

    fn try_claim(&mut self, id: &str) -> bool {
        let mut state = self.engine.lock_state();
        if self.is_stale(&state) || state.is_seen(id) {
            return false;
        }
        state.claimed.insert(id.to_string(), self.epoch);
        self.ids.push(id.to_string());
        true
    }

    fn release(&mut self, id: &str) {
        self.ids.retain(|claimed| claimed != id);
        let mut state = self.engine.lock_state();
        if state.claimed.get(id) == Some(&self.epoch) {
            state.claimed.remove(id);
        }
    }

    /// Move found records into the committed set and append their notifications.
    ///
    /// Returns `None` when the session ended or the epoch moved on since the
    /// pass started.
    fn commit(mut self, found: Vec<MissedDose>) -> Option<Vec<(MissedDose, String)>> {
        let mut state = self.engine.lock_state();
        if self.is_stale(&state) {
            return None;
        }

        let mut committed = Vec::with_capacity(found.len());
        for record in found {
            state.claimed.remove(&record.id);
            if state.missed.contains_key(&record.id) {
                continue;
            }
            let message = format_missed_notification(&record);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.notifications.push(message.clone());
            state.missed.insert(
                record.id.clone(),
                Slot {
                    seq,
                    record: record.clone(),
                },
            );
            committed.push((record, message));
        }

        // Whatever is still claimed was released already or belongs to a dismissed dose
        for id in self.ids.drain(..) {
            if state.claimed.get(&id) == Some(&self.epoch) {
                state.claimed.remove(&id);
            }
        }
        Some(committed)
    }
}

impl Drop for DoseClaims<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let mut state = self.engine.lock_state();
        for id in self.ids.drain(..) {
            if state.claimed.get(&id) == Some(&self.epoch) {
                state.claimed.remove(&id);
            }
        }
    }
}
