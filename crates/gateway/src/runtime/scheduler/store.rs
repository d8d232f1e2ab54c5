//! Job persistence over the document store (`jobs/{job_id}`).

use chrono::{DateTime, Utc};

use fiscus_domain::error::Result;
use fiscus_stores::paths;

use super::cron;
use super::job::RecurringJob;
use crate::state::AppState;

/// Upsert a job. The deterministic job id makes a re-save overwrite the
/// previous record. `next_execution` is (re)computed from the cron
/// expression for enabled jobs.
pub async fn save(state: &AppState, mut job: RecurringJob) -> Result<RecurringJob> {
    job.updated_at = Utc::now();
    if job.enabled {
        let tz = cron::parse_tz(&job.timezone);
        job.next_execution = cron::next_occurrence(&job.cron_expression, &Utc::now(), tz);
    } else {
        job.next_execution = None;
    }
    state
        .docs
        .set(&paths::job(&job.job_id), serde_json::to_value(&job)?)
        .await?;
    tracing::info!(
        job_id = %job.job_id,
        cron = %job.cron_expression,
        next_execution = ?job.next_execution,
        "job saved"
    );
    Ok(job)
}

pub async fn get(state: &AppState, job_id: &str) -> Result<Option<RecurringJob>> {
    match state.docs.get(&paths::job(job_id)).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

/// Every enabled job with `next_execution <= now`. Records that fail to
/// decode are skipped with a warning instead of poisoning the tick.
pub async fn due_jobs(state: &AppState, now: DateTime<Utc>) -> Result<Vec<RecurringJob>> {
    let rows = state.docs.query("jobs", &[]).await?;
    let mut due = Vec::new();
    for (id, doc) in rows {
        match serde_json::from_value::<RecurringJob>(doc) {
            Ok(job) if job.is_due(now) => due.push(job),
            Ok(_) => {}
            Err(e) => tracing::warn!(job_id = %id, error = %e, "undecodable job record"),
        }
    }
    Ok(due)
}

/// Disabling a job deletes its record; completed task records stay for
/// audit.
pub async fn delete(state: &AppState, job_id: &str) -> Result<bool> {
    state.docs.delete(&paths::job(job_id)).await
}

/// Mark a job fired: stamp `last_fired_at`, remember the launched task,
/// and advance `next_execution` past `now`.
pub async fn record_fired(
    state: &AppState,
    job: &RecurringJob,
    task_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let tz = cron::parse_tz(&job.timezone);
    let next = cron::next_occurrence(&job.cron_expression, &now, tz);
    state
        .docs
        .merge(
            &paths::job(&job.job_id),
            serde_json::json!({
                "last_fired_at": now.to_rfc3339(),
                "last_task_id": task_id,
                "next_execution": next.map(|n| n.to_rfc3339()),
                "updated_at": now.to_rfc3339(),
            }),
        )
        .await
}
