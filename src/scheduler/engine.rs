use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::CycleSchedule;
use crate::pipeline::{CycleOutcome, SessionSupervisor};

/// Main scheduler execution loop.
/// Sleeps until the next cron tick, then runs one cycle against the active session.
pub async fn run_scheduler_loop(schedule: CycleSchedule, supervisor: Arc<SessionSupervisor>) {
    info!(cron = %schedule.expr(), "Scheduler engine started");

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(cron = %schedule.expr(), "Schedule has no future runs; scheduler stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        info!(due = %next.to_rfc3339(), "Cycle due");
        // panics stay inside the spawned task
        let supervisor = supervisor.clone();
        let handle = tokio::spawn(async move { supervisor.run_cycle(None).await });
        match handle.await {
            Ok(Ok(CycleOutcome::Completed(incident))) => {
                info!(trace_id = %incident.trace_id, actions = incident.results.len(), "Scheduled cycle finished");
            }
            Ok(Ok(CycleOutcome::Skipped(skip))) => {
                info!(session_id = %skip.session.session_id, reason = %skip.reason, "Scheduled cycle skipped");
            }
            Ok(Err(e)) => error!("Scheduled cycle failed: {}", e),
            Err(e) => error!("Scheduled cycle task aborted: {}", e),
        }
    }
}
