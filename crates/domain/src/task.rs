//! Task records — the persisted description of one long-process dispatch.
//!
//! A record is written `Queued` before the worker POST goes out, so a
//! callback always finds it, and it survives process restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::WorkerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One dispatched long-process task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: WorkerKind,
    pub thread_key: String,
    pub user_id: String,
    pub company_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Short human-readable summary of what was dispatched.
    pub payload_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Scheduler job that fired this task, when not user-initiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl TaskRecord {
    pub fn new(
        task_id: impl Into<String>,
        task_type: WorkerKind,
        thread_key: impl Into<String>,
        user_id: impl Into<String>,
        company_id: impl Into<String>,
        payload_summary: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            task_type,
            thread_key: thread_key.into(),
            user_id: user_id.into(),
            company_id: company_id.into(),
            created_at: now,
            updated_at: now,
            status: TaskStatus::Queued,
            payload_summary: payload_summary.into(),
            result: None,
            error: None,
            job_id: None,
        }
    }

    /// Apply a status transition. Terminal records never re-open; a
    /// transition attempt on one returns `false` and leaves the record
    /// unchanged.
    pub fn transition(
        &mut self,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if result.is_some() {
            self.result = result;
        }
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Generate a fresh globally-unique task id.
    pub fn generate_id() -> String {
        format!("task_{}", uuid::Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            "task_1",
            WorkerKind::ApBookkeeper,
            "t1",
            "u1",
            "c1",
            "2 invoices",
        )
    }

    #[test]
    fn new_record_is_queued() {
        let r = record();
        assert_eq!(r.status, TaskStatus::Queued);
        assert!(!r.status.is_terminal());
    }

    #[test]
    fn transition_moves_toward_terminal() {
        let mut r = record();
        assert!(r.transition(TaskStatus::Running, None, None));
        assert!(r.transition(
            TaskStatus::Completed,
            Some(serde_json::json!({"booked": 2})),
            None
        ));
        assert_eq!(r.status, TaskStatus::Completed);
    }

    #[test]
    fn terminal_record_never_reopens() {
        let mut r = record();
        assert!(r.transition(TaskStatus::Failed, None, Some("boom".into())));
        let updated_at = r.updated_at;
        assert!(!r.transition(TaskStatus::Running, None, None));
        assert_eq!(r.status, TaskStatus::Failed);
        assert_eq!(r.updated_at, updated_at);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TaskRecord::generate_id();
        let b = TaskRecord::generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("task_"));
    }
}
