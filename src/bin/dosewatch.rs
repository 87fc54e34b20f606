use anyhow::Result;
use dosewatch::core::{Config, SystemClock, Viewer};
use dosewatch::features::medications::{MedicationRegistry, ScheduleFile, TakenLog};
use dosewatch::features::reminders::{
    format_missed_summary, ReminderEngine, ReminderEvent, ReminderScheduler,
};
use dotenvy::dotenv;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting dosewatch...");

    let schedule = ScheduleFile::load(&config.schedule_path)?;
    info!(
        "📄 Loaded {} medication(s) for patient {} from {}",
        schedule.medications.len(),
        schedule.patient_id,
        config.schedule_path
    );
    for entry in &schedule.medications {
        debug!(
            "  - {} {} ({}) at {}",
            entry.name,
            entry.dosage,
            entry.frequency.as_str(),
            entry.time_of_day.join(", ")
        );
    }

    let clock = Arc::new(SystemClock);
    let registry = Arc::new(MedicationRegistry::new(clock.clone()));
    let taken = TakenLog::new(clock.clone());
    schedule.seed(&registry, &taken);

    let engine = Arc::new(
        ReminderEngine::new(registry.clone(), Arc::new(taken), clock)
            .with_grace_minutes(config.reminders.grace_minutes),
    );
    let mut events = engine.subscribe();
    let scheduler = ReminderScheduler::start(engine, config.reminders);
    scheduler.refresh_on_changes(registry.subscribe());

    // Without an explicit patient, watch the one the schedule file belongs to
    let viewer = config.viewer().map(|v| match config.patient_id {
        Some(_) => v,
        None => Viewer::new(v.user_id, v.role, schedule.patient_id.clone()),
    });
    match &viewer {
        Some(v) if v.can_monitor() => {}
        Some(v) => warn!(
            "Viewer {} has role {}, missed-dose monitoring stays off",
            v.user_id, v.role
        ),
        None => warn!("DOSEWATCH_VIEWER_ID not set, missed-dose monitoring stays off"),
    }
    scheduler.set_viewer(viewer);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let ReminderEvent::DoseMissed { record, .. } = &event {
                        info!("💊 {}", format_missed_summary(record));
                    }
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("Failed to encode reminder event: {e}"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event output fell behind, skipped {skipped} event(s)");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}
