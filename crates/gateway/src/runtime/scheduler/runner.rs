//! Scheduler runner — a single minute-granularity ticker that launches
//! due recurring jobs through the same long-process client the agent
//! uses.

use std::time::Duration;

use chrono::{DateTime, Utc};

use fiscus_domain::context::{
    ThreadContext, DEFAULT_COMMUNICATION_MODE, DEFAULT_DMS_SYSTEM, DEFAULT_LOG_COMMUNICATION_MODE,
};
use fiscus_domain::task::{TaskRecord, TaskStatus};
use fiscus_domain::tool::LptInputs;
use fiscus_stores::paths;

use super::job::RecurringJob;
use super::store;
use crate::runtime::lpt;
use crate::state::AppState;

/// Spawn the fire loop. Ticks never overlap: the next interval slot waits
/// for the previous tick to finish.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(state.config.scheduler.tick_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = tick(&state, Utc::now()).await {
                tracing::error!(error = %e, "scheduler tick failed");
            }
        }
    })
}

/// One tick: fire every due job whose previous run is not still in
/// flight.
pub async fn tick(state: &AppState, now: DateTime<Utc>) -> fiscus_domain::Result<()> {
    let due = store::due_jobs(state, now).await?;
    for job in due {
        if previous_run_in_flight(state, &job).await {
            tracing::info!(job_id = %job.job_id, "previous run still active, skipping tick");
            continue;
        }
        fire(state, &job, now).await;
    }
    Ok(())
}

/// Overlap guard: the latest task record for this job still `queued` or
/// `running` means no concurrent duplicate. Eventually consistent by
/// nature; workers are idempotent on task_id.
async fn previous_run_in_flight(state: &AppState, job: &RecurringJob) -> bool {
    let Some(task_id) = &job.last_task_id else {
        return false;
    };
    let record = state
        .docs
        .get(&paths::task(&job.user_id, &job.thread_key, task_id))
        .await;
    match record {
        Ok(Some(doc)) => match serde_json::from_value::<TaskRecord>(doc) {
            Ok(record) => matches!(record.status, TaskStatus::Queued | TaskStatus::Running),
            Err(_) => false,
        },
        _ => false,
    }
}

async fn fire(state: &AppState, job: &RecurringJob, now: DateTime<Utc>) {
    tracing::info!(job_id = %job.job_id, job_type = %job.job_type, "firing scheduled job");

    let context = job_context(job);
    let inputs = LptInputs {
        instructions: job.instructions.clone(),
        ..Default::default()
    };

    let task_id = match lpt::launch(
        state,
        &context,
        &job.user_id,
        &job.company_id,
        &job.thread_key,
        job.job_type,
        &inputs,
        Some(&job.job_id),
    )
    .await
    {
        Ok(launch) => Some(launch.task_id),
        Err(e) => {
            tracing::warn!(job_id = %job.job_id, error = %e, "scheduled launch failed");
            None
        }
    };

    // Advance next_execution either way so a failing job cannot hot-loop
    // inside one window.
    if let Err(e) = store::record_fired(state, job, task_id.as_deref(), now).await {
        tracing::error!(job_id = %job.job_id, error = %e, "failed to record firing");
    }
}

/// Rebuild a dispatch context from the job's embedded fields. The client
/// uuid is the second segment of the mandate path.
fn job_context(job: &RecurringJob) -> ThreadContext {
    let client_uuid = job
        .mandate_path
        .split('/')
        .nth(1)
        .unwrap_or_default()
        .to_owned();
    ThreadContext {
        client_uuid,
        company_id: job.company_id.clone(),
        company_name: String::new(),
        mandate_path: job.mandate_path.clone(),
        dms_system: DEFAULT_DMS_SYSTEM.into(),
        communication_mode: DEFAULT_COMMUNICATION_MODE.into(),
        log_communication_mode: DEFAULT_LOG_COMMUNICATION_MODE.into(),
        drive_space_parent_id: String::new(),
        bank_erp: job.bank_erp.clone(),
    }
}

/// Owns the fire-loop task; aborts it on drop.
pub struct SchedulerHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn start(state: &AppState) -> Option<Self> {
        if !state.config.scheduler.enabled {
            tracing::info!("scheduler disabled by config");
            return None;
        }
        Some(Self {
            handle: spawn(state.clone()),
        })
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
