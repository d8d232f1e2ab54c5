//! Callback resumer — receives worker callbacks, updates the task record,
//! rehydrates the session if needed, and resumes the suspended workflow.
//!
//! Idempotent by task id: a record already in a terminal state is never
//! re-opened, and a duplicate callback produces no new messages.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use fiscus_domain::error::{Error, Result};
use fiscus_domain::task::{TaskRecord, TaskStatus};
use fiscus_stores::paths;

use super::agent_loop::{self, LoopRequest};
use super::presence;
use crate::state::AppState;

/// Wire format of `POST /lpt/callback`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    pub task_id: String,
    pub thread_key: String,
    pub user_id: String,
    /// `"completed"`, `"failed"`, or `"progress"`.
    pub status: String,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// What the resumer did with a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    /// Terminal callback: record updated, workflow resumed.
    Resumed,
    /// Progress update recorded; no resumption.
    ProgressRecorded,
    /// No task record found; logged and ignored.
    UnknownTask,
    /// Record already terminal; duplicate ignored.
    AlreadyTerminal,
}

/// Handle one worker callback end to end.
pub async fn handle_callback(
    state: &AppState,
    payload: CallbackPayload,
) -> Result<CallbackDisposition> {
    let record_path = paths::task(&payload.user_id, &payload.thread_key, &payload.task_id);

    // 1. The record is the source of truth; without it there is nothing
    //    to resume. Idempotency wins over strictness.
    let Some(record_doc) = state.docs.get(&record_path).await? else {
        tracing::warn!(
            task_id = %payload.task_id,
            thread_key = %payload.thread_key,
            "callback for unknown task, ignoring"
        );
        return Ok(CallbackDisposition::UnknownTask);
    };
    let mut record: TaskRecord = serde_json::from_value(record_doc).map_err(|e| {
        Error::CallbackRouting(format!("task record {} is undecodable: {e}", payload.task_id))
    })?;

    // 2. Progress callbacks update state without waking the brain.
    if payload.status == "progress" {
        state
            .docs
            .merge(
                &record_path,
                json!({
                    "progress": payload.progress,
                    "current_step": payload.current_step,
                    "status": "running",
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        state
            .docs
            .merge(
                &paths::notification(&payload.user_id, &payload.task_id),
                json!({"status": "running", "progress": payload.progress}),
            )
            .await?;
        return Ok(CallbackDisposition::ProgressRecorded);
    }

    // 3. Terminal transition, exactly once.
    if record.status.is_terminal() {
        tracing::info!(task_id = %payload.task_id, "duplicate callback for terminal task");
        return Ok(CallbackDisposition::AlreadyTerminal);
    }
    let status = if payload.status == "completed" {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    record.transition(status, payload.result.clone(), payload.error.clone());
    state
        .docs
        .set(&record_path, serde_json::to_value(&record)?)
        .await?;
    state
        .docs
        .merge(
            &paths::notification(&payload.user_id, &payload.task_id),
            json!({"status": payload.status}),
        )
        .await?;

    // 4–5. Connection mode, then session/brain rehydration. The worker
    //    may have outlived the user's session; the registry recreates it.
    let company_id = record.company_id.clone();
    let mode = presence::classify(
        state.ephemeral.as_ref(),
        &payload.user_id,
        state.config.presence.heartbeat_fresh_secs,
        Utc::now(),
    )
    .await;

    tracing::info!(
        task_id = %payload.task_id,
        thread_key = %payload.thread_key,
        status = %payload.status,
        mode = ?mode,
        "resuming workflow from callback"
    );

    // 6–8. The loop removes the task id from the brain's active set under
    //    the thread lock, then continues the mission with the result.
    let continuation = continuation_message(&record, &payload);
    agent_loop::run(
        state,
        LoopRequest {
            user_id: payload.user_id.clone(),
            company_id,
            thread_key: payload.thread_key.clone(),
            initial_query: continuation,
            mode,
            resume_task: Some(payload.task_id.clone()),
        },
    )
    .await;

    Ok(CallbackDisposition::Resumed)
}

/// The templated continuation block injected as the resumed loop's query.
fn continuation_message(record: &TaskRecord, payload: &CallbackPayload) -> String {
    let outcome = match (&payload.result, &payload.error) {
        (Some(result), _) => format!("Result: {result}."),
        (None, Some(error)) => format!("Error: {error}."),
        (None, None) => "No result payload was attached.".to_owned(),
    };
    format!(
        "Task {} ({}) {}. {} Continue the mission with this result, or call TERMINATE_TASK \
         if the work is complete.",
        record.task_id,
        record.task_type.as_str(),
        payload.status,
        outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit;
    use fiscus_domain::tool::WorkerKind;

    async fn seed_task(state: &AppState, task_id: &str) {
        let record = TaskRecord::new(
            task_id,
            WorkerKind::ApBookkeeper,
            "t1",
            "u1",
            "c1",
            "2 invoices",
        );
        state
            .docs
            .set(
                &paths::task("u1", "t1", task_id),
                serde_json::to_value(&record).unwrap(),
            )
            .await
            .unwrap();
    }

    fn completed_payload(task_id: &str) -> CallbackPayload {
        CallbackPayload {
            task_id: task_id.into(),
            thread_key: "t1".into(),
            user_id: "u1".into(),
            status: "completed".into(),
            progress: None,
            current_step: None,
            result: Some(json!({"booked": 2})),
            error: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn unknown_task_is_an_idempotent_no_op() {
        let state = testkit::state();
        let disposition = handle_callback(&state, completed_payload("task_missing"))
            .await
            .unwrap();
        assert_eq!(disposition, CallbackDisposition::UnknownTask);
    }

    #[tokio::test]
    async fn completed_callback_updates_record_and_resumes() {
        let state = testkit::state();
        state
            .seeded_llm
            .push_turn(fiscus_providers::scripted::ScriptedTurn::terminate(
                "Both invoices booked.",
            ));
        testkit::seed_profile(&state, "u1", "c1").await;
        seed_task(&state, "task_42").await;

        // Simulate the suspended brain holding the task.
        {
            let session = state.registry.get_or_create("u1", "c1");
            let brain = session.brain("t1");
            brain.lock().await.add_task("task_42");
        }

        let disposition = handle_callback(&state, completed_payload("task_42"))
            .await
            .unwrap();
        assert_eq!(disposition, CallbackDisposition::Resumed);

        // Record is terminal with the result attached.
        let record: TaskRecord = serde_json::from_value(
            state
                .docs
                .get(&paths::task("u1", "t1", "task_42"))
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(json!({"booked": 2})));

        // The brain dropped the task id.
        let session = state.registry.get("u1", "c1").unwrap();
        let brain = session.brain("t1");
        assert!(!brain.lock().await.has_task("task_42"));

        // The continuation produced one assistant message.
        let records = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.content, "Both invoices booked.");
    }

    #[tokio::test]
    async fn duplicate_terminal_callback_produces_nothing() {
        let state = testkit::state();
        state
            .seeded_llm
            .push_turn(fiscus_providers::scripted::ScriptedTurn::terminate("done"));
        testkit::seed_profile(&state, "u1", "c1").await;
        seed_task(&state, "task_42").await;

        handle_callback(&state, completed_payload("task_42"))
            .await
            .unwrap();
        let messages_after_first = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap()
            .len();

        let disposition = handle_callback(&state, completed_payload("task_42"))
            .await
            .unwrap();
        assert_eq!(disposition, CallbackDisposition::AlreadyTerminal);
        let messages_after_second = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap()
            .len();
        assert_eq!(messages_after_first, messages_after_second);
    }

    #[tokio::test]
    async fn progress_callback_records_without_resuming() {
        let state = testkit::state();
        seed_task(&state, "task_42").await;

        let disposition = handle_callback(
            &state,
            CallbackPayload {
                status: "progress".into(),
                progress: Some(40),
                current_step: Some("posting entries".into()),
                result: None,
                ..completed_payload("task_42")
            },
        )
        .await
        .unwrap();
        assert_eq!(disposition, CallbackDisposition::ProgressRecorded);

        let record = state
            .docs
            .get(&paths::task("u1", "t1", "task_42"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["progress"], 40);
        assert_eq!(record["status"], "running");

        // No model call, no transcript message.
        assert!(state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failed_callback_feeds_the_error_into_the_continuation() {
        let state = testkit::state();
        state
            .seeded_llm
            .push_turn(fiscus_providers::scripted::ScriptedTurn::terminate(
                "The booking failed; I flagged it for review.",
            ));
        testkit::seed_profile(&state, "u1", "c1").await;
        seed_task(&state, "task_42").await;

        handle_callback(
            &state,
            CallbackPayload {
                status: "failed".into(),
                result: None,
                error: Some("ledger locked".into()),
                ..completed_payload("task_42")
            },
        )
        .await
        .unwrap();

        let requests = state.seeded_llm.recorded_requests();
        let continuation = requests[0]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == fiscus_domain::chat::Role::User)
            .unwrap()
            .content
            .extract_all_text();
        assert!(continuation.contains("task_42"));
        assert!(continuation.contains("failed"));
        assert!(continuation.contains("ledger locked"));
    }

    #[tokio::test]
    async fn session_is_recreated_when_absent() {
        let state = testkit::state();
        state
            .seeded_llm
            .push_turn(fiscus_providers::scripted::ScriptedTurn::terminate("done"));
        testkit::seed_profile(&state, "u1", "c1").await;
        seed_task(&state, "task_42").await;
        assert!(state.registry.get("u1", "c1").is_none());

        handle_callback(&state, completed_payload("task_42"))
            .await
            .unwrap();
        assert!(state.registry.get("u1", "c1").is_some());
    }
}
