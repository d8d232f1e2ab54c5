//! Recurring job model — the persisted description of one scheduled
//! long-process launch.
//!
//! Job ids are deterministic (`{mandate}_{job_type}`), so saving the same
//! job twice upserts one record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fiscus_domain::tool::WorkerKind;

/// Deterministic job id. Slashes in the mandate path are flattened so the
/// id stays a single document segment under `jobs/`.
pub fn job_id(mandate_path: &str, job_type: WorkerKind) -> String {
    format!("{}_{}", mandate_path.replace('/', "-"), job_type.as_str())
}

/// One recurring launch, with the full context needed to dispatch without
/// a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringJob {
    pub job_id: String,
    pub job_type: WorkerKind,
    /// 5-field cron expression, evaluated in `timezone`.
    pub cron_expression: String,
    pub timezone: String,
    pub enabled: bool,
    #[serde(default)]
    pub next_execution: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Task record of the most recent launch, for the overlap check.
    #[serde(default)]
    pub last_task_id: Option<String>,

    // ── Embedded dispatch context ─────────────────────────────────────
    pub user_id: String,
    pub company_id: String,
    pub thread_key: String,
    pub mandate_path: String,
    #[serde(default)]
    pub bank_erp: String,
    #[serde(default)]
    pub instructions: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringJob {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_execution.is_some_and(|next| next <= now)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User-facing schedule → cron translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The schedule shape the frontend saves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub frequency: Frequency,
    /// `"HH:MM"` local to `timezone`. Ignored for `Hourly`.
    #[serde(default)]
    pub time: Option<String>,
    /// 0 = Sunday. Required for `Weekly`.
    #[serde(default)]
    pub day_of_week: Option<u8>,
    /// 1–31. Required for `Monthly`.
    #[serde(default)]
    pub day_of_month: Option<u8>,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Translate a schedule spec into a standard 5-field cron expression.
pub fn to_cron(spec: &ScheduleSpec) -> String {
    let (hour, minute) = parse_time(spec.time.as_deref());
    match spec.frequency {
        Frequency::Hourly => format!("{minute} * * * *"),
        Frequency::Daily => format!("{minute} {hour} * * *"),
        Frequency::Weekly => {
            let dow = spec.day_of_week.unwrap_or(1).min(6);
            format!("{minute} {hour} * * {dow}")
        }
        Frequency::Monthly => {
            let dom = spec.day_of_month.unwrap_or(1).clamp(1, 31);
            format!("{minute} {hour} {dom} * *")
        }
    }
}

fn parse_time(time: Option<&str>) -> (u8, u8) {
    let Some(time) = time else { return (3, 0) };
    let mut parts = time.splitn(2, ':');
    let hour = parts.next().and_then(|h| h.parse().ok()).unwrap_or(3);
    let minute = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    (hour.min(23), minute.min(59))
}
