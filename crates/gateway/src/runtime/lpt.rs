//! Long-process client — builds the full worker payload from the thread
//! context, persists the task record and UI notification, and posts to
//! the worker endpoint.
//!
//! Ordering matters here: the task record is written `queued` before the
//! POST goes out, so a worker callback always finds a record, even if the
//! process dies between dispatch and acceptance.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use fiscus_domain::context::ThreadContext;
use fiscus_domain::error::{Error, Result};
use fiscus_domain::task::{TaskRecord, TaskStatus};
use fiscus_domain::tool::{LptInputs, WorkerKind};
use fiscus_stores::paths;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker transport port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transport to the worker fleet. Workers execute asynchronously; any 2xx
/// on the POST means "accepted", the real result arrives via callback.
#[async_trait]
pub trait WorkerDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: &str, payload: &Value, timeout: Duration) -> Result<()>;
}

/// Production transport over reqwest.
pub struct HttpWorkerDispatcher {
    client: reqwest::Client,
}

impl HttpWorkerDispatcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkerDispatcher for HttpWorkerDispatcher {
    async fn dispatch(&self, endpoint: &str, payload: &Value, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("worker {endpoint} did not accept within deadline"))
                } else {
                    Error::Dispatch(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "worker {endpoint} rejected dispatch: HTTP {} {body}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Launch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receipt of an accepted dispatch.
#[derive(Debug, Clone)]
pub struct LptLaunch {
    pub task_id: String,
    pub thread_key: String,
    /// Human-readable launch summary ("Booking started for 2 invoices").
    pub summary: String,
}

/// Dispatch one long-process task.
///
/// The model only supplied `inputs`; everything else in the wire payload
/// is injected here from the context. Returns `Err` when the context is
/// not dispatch-ready, no endpoint is configured, or the worker refuses:
/// in every failure case after record creation, the record is terminal
/// `failed`.
#[allow(clippy::too_many_arguments)]
pub async fn launch(
    state: &AppState,
    context: &ThreadContext,
    user_id: &str,
    company_id: &str,
    thread_key: &str,
    kind: WorkerKind,
    inputs: &LptInputs,
    job_id: Option<&str>,
) -> Result<LptLaunch> {
    if !context.is_dispatch_ready() {
        return Err(Error::ContextLoad(format!(
            "business context for {company_id} is incomplete; cannot dispatch {kind}"
        )));
    }
    let endpoint = state
        .config
        .workers
        .endpoints
        .get(kind.as_str())
        .ok_or_else(|| Error::Dispatch(format!("no worker endpoint configured for {kind}")))?
        .clone();

    let task_id = TaskRecord::generate_id();
    let summary = launch_summary(kind, inputs);

    // 1. Task record first — a callback must always find it.
    let mut record = TaskRecord::new(&task_id, kind, thread_key, user_id, company_id, &summary);
    record.job_id = job_id.map(String::from);
    let record_path = paths::task(user_id, thread_key, &task_id);
    state
        .docs
        .set(&record_path, serde_json::to_value(&record)?)
        .await?;

    // 2. Notification so the UI sees immediate feedback.
    state
        .docs
        .set(
            &paths::notification(user_id, &task_id),
            json!({
                "task_id": task_id,
                "task_type": kind.as_str(),
                "status": "in queue",
                "summary": summary,
                "created_at": record.created_at.to_rfc3339(),
            }),
        )
        .await?;

    // 3. POST to the worker.
    let payload = build_payload(state, context, user_id, company_id, thread_key, &task_id, kind, inputs);
    let timeout = Duration::from_millis(state.config.workers.dispatch_timeout_ms);
    match state.workers.dispatch(&endpoint, &payload, timeout).await {
        Ok(()) => {
            tracing::info!(task_id = %task_id, worker = %kind, thread_key, "task dispatched");
            Ok(LptLaunch {
                task_id,
                thread_key: thread_key.to_owned(),
                summary,
            })
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, worker = %kind, error = %e, "dispatch failed");
            record.transition(TaskStatus::Failed, None, Some(e.to_string()));
            state
                .docs
                .set(&record_path, serde_json::to_value(&record)?)
                .await?;
            state
                .docs
                .merge(
                    &paths::notification(user_id, &task_id),
                    json!({"status": "failed", "error": e.to_string()}),
                )
                .await?;
            Err(e)
        }
    }
}

/// The full wire payload. `thread_key` is always present — workers echo
/// it in their callback so the resumer can route.
#[allow(clippy::too_many_arguments)]
fn build_payload(
    state: &AppState,
    context: &ThreadContext,
    user_id: &str,
    company_id: &str,
    thread_key: &str,
    task_id: &str,
    kind: WorkerKind,
    inputs: &LptInputs,
) -> Value {
    json!({
        "task_id": task_id,
        "task_type": kind.as_str(),
        "user_id": user_id,
        "company_id": company_id,
        "thread_key": thread_key,
        "callback_url": format!("{}/lpt/callback", state.config.workers.callback_base_url),
        "context": {
            "client_uuid": context.client_uuid,
            "mandate_path": context.mandate_path,
            "dms_system": context.dms_system,
            "communication_mode": context.communication_mode,
            "log_communication_mode": context.log_communication_mode,
            "drive_space_parent_id": context.drive_space_parent_id,
            "bank_erp": context.bank_erp,
            "company_name": context.company_name,
        },
        "inputs": inputs,
    })
}

fn launch_summary(kind: WorkerKind, inputs: &LptInputs) -> String {
    match kind {
        WorkerKind::ApBookkeeper => {
            let n = inputs.invoice_ids.len();
            format!("Booking started for {n} invoice{}", plural(n))
        }
        WorkerKind::Router => match &inputs.drive_file_id {
            Some(id) => format!("Document routing started for {id}"),
            None => "Document routing started".to_owned(),
        },
        WorkerKind::BankReconciler => {
            let n = inputs.transaction_ids.len();
            format!("Reconciliation started for {n} transaction{}", plural(n))
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit;

    fn inputs() -> LptInputs {
        LptInputs {
            invoice_ids: vec!["i1".into(), "i2".into()],
            instructions: Some("book these".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn launch_persists_record_before_dispatch() {
        let state = testkit::state();
        let context = testkit::ready_context("c1");

        let launch = launch(
            &state,
            &context,
            "u1",
            "c1",
            "t1",
            WorkerKind::ApBookkeeper,
            &inputs(),
            None,
        )
        .await
        .unwrap();

        // Record exists, queued, with the payload echo fields.
        let record: TaskRecord = serde_json::from_value(
            state
                .docs
                .get(&paths::task("u1", "t1", &launch.task_id))
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.thread_key, "t1");
        assert_eq!(record.company_id, "c1");

        // Notification written "in queue".
        let notif = state
            .docs
            .get(&paths::notification("u1", &launch.task_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notif["status"], "in queue");

        // Payload carried ids, context, and the thread key.
        let sent = state.seeded_workers.sent();
        assert_eq!(sent.len(), 1);
        let (endpoint, payload) = &sent[0];
        assert!(endpoint.contains("ap_bookkeeper"));
        assert_eq!(payload["thread_key"], "t1");
        assert_eq!(payload["task_id"], launch.task_id.as_str());
        assert_eq!(payload["user_id"], "u1");
        assert_eq!(payload["company_id"], "c1");
        assert_eq!(payload["inputs"]["invoice_ids"], serde_json::json!(["i1", "i2"]));
        assert_eq!(payload["context"]["mandate_path"], context.mandate_path.as_str());

        assert_eq!(launch.summary, "Booking started for 2 invoices");
    }

    #[tokio::test]
    async fn failed_post_marks_record_failed() {
        let state = testkit::state();
        state.seeded_workers.fail_next("worker down");
        let context = testkit::ready_context("c1");

        let err = launch(
            &state,
            &context,
            "u1",
            "c1",
            "t1",
            WorkerKind::ApBookkeeper,
            &inputs(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));

        let rows = state
            .docs
            .query(&paths::tasks("u1", "t1"), &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let record: TaskRecord = serde_json::from_value(rows[0].1.clone()).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("worker down"));
    }

    #[tokio::test]
    async fn incomplete_context_refuses_dispatch() {
        let state = testkit::state();
        let err = launch(
            &state,
            &ThreadContext::default(),
            "u1",
            "c1",
            "t1",
            WorkerKind::ApBookkeeper,
            &inputs(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ContextLoad(_)));
        // Nothing persisted, nothing posted.
        assert!(state
            .docs
            .query(&paths::tasks("u1", "t1"), &[])
            .await
            .unwrap()
            .is_empty());
        assert!(state.seeded_workers.sent().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_worker_kind_is_a_dispatch_error() {
        let mut state = testkit::state();
        let mut config = (*state.config).clone();
        config.workers.endpoints.remove("router");
        state.config = std::sync::Arc::new(config);

        let err = launch(
            &state,
            &testkit::ready_context("c1"),
            "u1",
            "c1",
            "t1",
            WorkerKind::Router,
            &LptInputs::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }

    #[test]
    fn summaries_read_naturally() {
        assert_eq!(
            launch_summary(
                WorkerKind::ApBookkeeper,
                &LptInputs {
                    invoice_ids: vec!["i1".into()],
                    ..Default::default()
                }
            ),
            "Booking started for 1 invoice"
        );
        assert_eq!(
            launch_summary(WorkerKind::Router, &LptInputs::default()),
            "Document routing started"
        );
    }
}
