//! Recurring-job management: `POST /jobs` saves (upserts) a job from a
//! user-facing schedule spec, `DELETE /jobs/:job_id` disables it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use fiscus_domain::tool::WorkerKind;

use crate::runtime::scheduler::job::to_cron;
use crate::runtime::scheduler::{cron, job_id, store, RecurringJob, ScheduleSpec};
use crate::state::AppState;

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct SaveJobRequest {
    pub job_type: WorkerKind,
    pub schedule: ScheduleSpec,
    pub enabled: bool,
    // ── Dispatch context embedded into the job ────────────────────────
    pub user_id: String,
    pub company_id: String,
    pub thread_key: String,
    pub mandate_path: String,
    #[serde(default)]
    pub bank_erp: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

pub async fn save_job(
    State(state): State<AppState>,
    Json(body): Json<SaveJobRequest>,
) -> (StatusCode, Json<Value>) {
    let cron_expression = to_cron(&body.schedule);
    if !cron::is_valid(&cron_expression) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error": "schedule does not translate to a valid cron"})),
        );
    }

    let now = Utc::now();
    let job = RecurringJob {
        job_id: job_id(&body.mandate_path, body.job_type),
        job_type: body.job_type,
        cron_expression,
        timezone: body.schedule.timezone.clone(),
        enabled: body.enabled,
        next_execution: None,
        last_fired_at: None,
        last_task_id: None,
        user_id: body.user_id,
        company_id: body.company_id,
        thread_key: body.thread_key,
        mandate_path: body.mandate_path,
        bank_erp: body.bank_erp,
        instructions: body.instructions,
        created_at: now,
        updated_at: now,
    };

    match store::save(&state, job).await {
        Ok(saved) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "job_id": saved.job_id,
                "cron_expression": saved.cron_expression,
                "next_execution": saved.next_execution,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": e.to_string()})),
        ),
    }
}

/// Disabling deletes the scheduler record; task records of past runs
/// stay for audit.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match store::delete(&state, &job_id).await {
        Ok(true) => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "no such job"})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": e.to_string()})),
        ),
    }
}
