//! # Feature: Reminder Scheduler
//!
//! Owns the background tasks that drive the missed-dose engine: the periodic
//! evaluation loop (with its immediate first pass) and the day-rollover
//! watchdog. Handles are kept here and cancelled together on shutdown or drop.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.2.0: Immediate re-check when the medication list changes
//! - 1.1.0: Monitoring sessions; stopping discards in-flight lookups
//! - 1.0.0: Initial release with evaluation loop and day watchdog

use crate::core::config::ReminderSettings;
use crate::core::viewer::Viewer;
use crate::features::reminders::engine::{ReminderEngine, SessionToken};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

struct Monitoring {
    viewer: Viewer,
    session: Arc<SessionToken>,
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct ScheduledTasks {
    monitoring: Option<Monitoring>,
    day_watch: Option<JoinHandle<()>>,
    change_watch: Option<JoinHandle<()>>,
}

impl ScheduledTasks {
    /// Wake the running evaluation loop, if any
    fn refresh(&self) -> bool {
        match &self.monitoring {
            Some(monitoring) => {
                monitoring.refresh.notify_one();
                true
            }
            None => false,
        }
    }
}

pub struct ReminderScheduler {
    engine: Arc<ReminderEngine>,
    settings: ReminderSettings,
    tasks: Arc<Mutex<ScheduledTasks>>,
}

fn lock(tasks: &Mutex<ScheduledTasks>) -> MutexGuard<'_, ScheduledTasks> {
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}

impl ReminderScheduler {
    /// Mount the engine and start the day-rollover watchdog.
    ///
    /// Must be called from within a Tokio runtime. Monitoring stays off until
    /// [`set_viewer`](Self::set_viewer) is given a caretaker.
    pub fn start(engine: Arc<ReminderEngine>, settings: ReminderSettings) -> Self {
        let watch_engine = engine.clone();
        let period = settings.day_watch_interval;
        let day_watch = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                watch_engine.check_day_rollover();
            }
        });

        info!(
            "Day-rollover watchdog started (interval: {}s)",
            period.as_secs()
        );

        ReminderScheduler {
            engine,
            settings,
            tasks: Arc::new(Mutex::new(ScheduledTasks {
                monitoring: None,
                day_watch: Some(day_watch),
                change_watch: None,
            })),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, ScheduledTasks> {
        lock(&self.tasks)
    }

    /// Update who is watching.
    ///
    /// A caretaker starts (or restarts, if the viewer changed) the evaluation
    /// loop with an immediate pass; anything else stops it. Returns whether
    /// monitoring is running afterwards.
    pub fn set_viewer(&self, viewer: Option<Viewer>) -> bool {
        let mut tasks = self.lock_tasks();

        let eligible = viewer.filter(|v| v.can_monitor());
        if let (Some(current), Some(next)) = (&tasks.monitoring, &eligible) {
            if current.viewer == *next {
                return true;
            }
        }

        if let Some(previous) = tasks.monitoring.take() {
            self.stop(previous);
        }

        match eligible {
            Some(viewer) => {
                tasks.monitoring = Some(self.spawn_monitoring(viewer));
                true
            }
            None => false,
        }
    }

    /// Run an evaluation pass now instead of waiting for the next tick.
    ///
    /// Returns false when nothing is being monitored.
    pub fn refresh(&self) -> bool {
        self.lock_tasks().refresh()
    }

    /// Re-check immediately whenever a medication id arrives on `changes`,
    /// e.g. from [`MedicationRegistry::subscribe`](crate::features::medications::MedicationRegistry::subscribe).
    pub fn refresh_on_changes(&self, mut changes: broadcast::Receiver<String>) {
        let tasks = self.tasks.clone();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(medication_id) => {
                        if lock(&tasks).refresh() {
                            debug!("Medication {} changed, re-checking doses", medication_id);
                        }
                    }
                    Err(RecvError::Lagged(_)) => {
                        lock(&tasks).refresh();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.lock_tasks().change_watch.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the evaluation loop, keeping the watchdog and current alerts
    pub fn stop_monitoring(&self) {
        let previous = self.lock_tasks().monitoring.take();
        if let Some(previous) = previous {
            self.stop(previous);
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.lock_tasks().monitoring.is_some()
    }

    /// The viewer the evaluation loop is running for, if any
    pub fn current_viewer(&self) -> Option<Viewer> {
        self.lock_tasks()
            .monitoring
            .as_ref()
            .map(|m| m.viewer.clone())
    }

    /// Cancel every task owned by the scheduler
    pub fn shutdown(&self) {
        let (monitoring, day_watch, change_watch) = {
            let mut tasks = self.lock_tasks();
            (
                tasks.monitoring.take(),
                tasks.day_watch.take(),
                tasks.change_watch.take(),
            )
        };

        if let Some(monitoring) = monitoring {
            self.stop(monitoring);
        }
        if let Some(change_watch) = change_watch {
            change_watch.abort();
        }
        if let Some(day_watch) = day_watch {
            day_watch.abort();
            info!("Reminder scheduler shut down");
        }
    }

    fn spawn_monitoring(&self, viewer: Viewer) -> Monitoring {
        let engine = self.engine.clone();
        let session = Arc::new(SessionToken::new());
        let refresh = Arc::new(Notify::new());
        let period = self.settings.evaluation_interval;

        info!(
            "🩺 Monitoring patient {} for caretaker {} (interval: {}s)",
            viewer.patient_id,
            viewer.user_id,
            period.as_secs()
        );

        let task_viewer = viewer.clone();
        let task_session = session.clone();
        let task_refresh = refresh.clone();
        let handle = tokio::spawn(async move {
            // The first tick completes immediately, giving the initial pass
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = task_refresh.notified() => {}
                }
                if task_session.is_cancelled() {
                    break;
                }
                let report = engine
                    .evaluate_in_session(&task_viewer, &task_session)
                    .await;
                debug!(
                    "Missed-dose pass: checked={} overdue={} new={} failed={} malformed={}",
                    report.checked,
                    report.overdue,
                    report.newly_missed.len(),
                    report.failed,
                    report.malformed
                );
            }
        });

        Monitoring {
            viewer,
            session,
            refresh,
            handle,
        }
    }

    fn stop(&self, monitoring: Monitoring) {
        self.engine.cancel_session(&monitoring.session);
        monitoring.handle.abort();
        info!(
            "Stopped monitoring patient {} for {}",
            monitoring.viewer.patient_id, monitoring.viewer.user_id
        );
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::features::medications::{
        Frequency, Medication, MedicationRegistry, TakenStatusOracle,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const PATIENT: &str = "patient-1";

    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TakenStatusOracle for CountingOracle {
        async fn was_taken_today(&self, _medication_id: &str, _user_id: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Always "taken" so every tick queries again
            Ok(true)
        }
    }

    struct GatedOracle {
        gate: Notify,
        entered: Notify,
    }

    #[async_trait]
    impl TakenStatusOracle for GatedOracle {
        async fn was_taken_today(&self, _medication_id: &str, _user_id: &str) -> Result<bool> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(false)
        }
    }

    fn medication(id: &str, time: &str) -> Medication {
        let created = NaiveDateTime::parse_from_str("2024-03-01 00:00", "%Y-%m-%d %H:%M").unwrap();
        Medication {
            id: id.to_string(),
            name: "Aspirin".to_string(),
            dosage: "100mg".to_string(),
            frequency: Frequency::Daily,
            time_of_day: vec![time.to_string()],
            user_id: PATIENT.to_string(),
            created_at: created,
            updated_at: created,
            is_active: true,
        }
    }

    fn settings() -> ReminderSettings {
        ReminderSettings {
            grace_minutes: 15,
            evaluation_interval: Duration::from_secs(60),
            day_watch_interval: Duration::from_secs(60),
        }
    }

    fn build(
        time: &str,
        oracle: Arc<dyn TakenStatusOracle>,
    ) -> (Arc<ReminderEngine>, ManualClock) {
        let clock = ManualClock::at("2024-03-01", time).unwrap();
        let registry = MedicationRegistry::new(Arc::new(clock.clone()));
        registry.insert(medication("m1", "08:00"));
        let engine = ReminderEngine::new(Arc::new(registry), oracle, Arc::new(clock.clone()));
        (Arc::new(engine), clock)
    }

    /// Let spawned tasks run up to their next timer
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_pass_then_interval() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());

        assert!(scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT))));
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_patient_viewer_does_not_monitor() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());

        assert!(!scheduler.set_viewer(Some(Viewer::patient(PATIENT))));
        assert!(!scheduler.set_viewer(None));
        tokio::time::sleep(Duration::from_secs(180)).await;
        settle().await;

        assert!(!scheduler.is_monitoring());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_switch_stops_loop() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());

        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        settle().await;
        scheduler.set_viewer(Some(Viewer::patient("carer-1")));

        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;

        assert!(!scheduler.is_monitoring());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_viewer_does_not_restart() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());
        let viewer = Viewer::caretaker("carer-1", PATIENT);

        scheduler.set_viewer(Some(viewer.clone()));
        settle().await;
        scheduler.set_viewer(Some(viewer.clone()));
        settle().await;

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.current_viewer(), Some(viewer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_viewer_restarts_with_immediate_pass() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());

        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        settle().await;
        scheduler.set_viewer(Some(Viewer::caretaker("carer-2", PATIENT)));
        settle().await;

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.current_viewer().unwrap().user_id, "carer-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_medication_change_triggers_immediate_pass() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let clock = ManualClock::at("2024-03-01", "12:00").unwrap();
        let registry = MedicationRegistry::new(Arc::new(clock.clone()));
        registry.insert(medication("m1", "08:00"));
        let engine = Arc::new(ReminderEngine::new(
            Arc::new(registry.clone()),
            oracle.clone(),
            Arc::new(clock),
        ));
        let scheduler = ReminderScheduler::start(engine, settings());
        scheduler.refresh_on_changes(registry.subscribe());

        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        // Well before the next 60s tick
        tokio::time::sleep(Duration::from_secs(5)).await;
        registry.insert(medication("m2", "09:00"));
        settle().await;

        // Both doses checked again without waiting for the interval
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_monitoring_is_noop() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine, settings());

        assert!(!scheduler.refresh());

        // No stored wake-up: starting monitoring runs exactly one pass
        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        assert!(scheduler.refresh());
        settle().await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_lookup() {
        let oracle = Arc::new(GatedOracle {
            gate: Notify::new(),
            entered: Notify::new(),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine.clone(), settings());

        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        oracle.entered.notified().await;
        assert!(engine.is_seen("m1-08:00"));

        scheduler.stop_monitoring();
        oracle.gate.notify_one();
        settle().await;

        assert!(engine.missed_doses().is_empty());
        assert!(engine.notifications().is_empty());
        assert!(!engine.is_seen("m1-08:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_resets_at_midnight_once() {
        let oracle = Arc::new(GatedOracle {
            gate: Notify::new(),
            entered: Notify::new(),
        });
        let (engine, clock) = build("23:58", oracle);
        let scheduler = ReminderScheduler::start(engine.clone(), settings());
        let mut events = engine.subscribe();
        settle().await;

        clock.set(NaiveDateTime::parse_from_str("2024-03-02 00:00", "%Y-%m-%d %H:%M").unwrap());
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        clock.set(NaiveDateTime::parse_from_str("2024-03-02 00:01", "%Y-%m-%d %H:%M").unwrap());
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, clock) = build("12:00", oracle.clone());
        let scheduler = ReminderScheduler::start(engine.clone(), settings());
        scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
        settle().await;

        scheduler.shutdown();
        assert!(!scheduler.is_monitoring());

        clock.set(NaiveDateTime::parse_from_str("2024-03-02 00:00", "%Y-%m-%d %H:%M").unwrap());
        let mut events = engine.subscribe();
        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_tasks() {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
        });
        let (engine, _clock) = build("12:00", oracle.clone());
        {
            let scheduler = ReminderScheduler::start(engine.clone(), settings());
            scheduler.set_viewer(Some(Viewer::caretaker("carer-1", PATIENT)));
            settle().await;
        }

        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&engine), 1);
    }
}
