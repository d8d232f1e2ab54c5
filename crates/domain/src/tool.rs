//! Tool model — the calls the LLM can emit and their typed decoding.
//!
//! The LLM sees a name + JSON-schema per tool; internally every call is
//! decoded into the [`AgentTool`] variant it names so the dispatcher can
//! match exhaustively. Long-process tools deliberately carry only
//! identifiers and free-text instructions — the dispatcher injects the
//! rest of the wire payload from the thread context, so the model never
//! sees (and cannot forge) credentials or routing fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal tool call format (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool names
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const TOOL_GET_STRUCTURED_DATA: &str = "GET_STRUCTURED_DATA";
pub const TOOL_SEARCH_VECTOR_STORE: &str = "SEARCH_VECTOR_STORE";
pub const TOOL_GET_USER_CONTEXT: &str = "GET_USER_CONTEXT";
pub const TOOL_TERMINATE_TASK: &str = "TERMINATE_TASK";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filters (structured-data lookups)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single filter predicate on a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    #[serde(default)]
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[default]
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Long-process worker kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The external worker families a long-process dispatch can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    ApBookkeeper,
    Router,
    BankReconciler,
}

impl WorkerKind {
    /// Stable identifier used in task records and worker endpoint config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApBookkeeper => "ap_bookkeeper",
            Self::Router => "router",
            Self::BankReconciler => "bank_reconciler",
        }
    }

    /// Name the LLM invokes this worker under.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::ApBookkeeper => "LPT_APBookkeeper",
            Self::Router => "LPT_Router",
            Self::BankReconciler => "LPT_BankReconciler",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "LPT_APBookkeeper" => Some(Self::ApBookkeeper),
            "LPT_Router" => Some(Self::Router),
            "LPT_BankReconciler" => Some(Self::BankReconciler),
            _ => None,
        }
    }

    pub fn from_str_id(id: &str) -> Option<Self> {
        match id {
            "ap_bookkeeper" => Some(Self::ApBookkeeper),
            "router" => Some(Self::Router),
            "bank_reconciler" => Some(Self::BankReconciler),
            _ => None,
        }
    }

    pub fn all() -> [WorkerKind; 3] {
        [Self::ApBookkeeper, Self::Router, Self::BankReconciler]
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model-visible inputs of a long-process dispatch: identifiers plus
/// free-text instructions, nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LptInputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invoice_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transaction_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl LptInputs {
    /// Count of concrete items referenced, for progress wording.
    pub fn item_count(&self) -> usize {
        self.invoice_ids.len()
            + self.transaction_ids.len()
            + usize::from(self.drive_file_id.is_some())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentTool — the decoded call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool call decoded into its typed form.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTool {
    GetStructuredData {
        path: String,
        filters: Vec<FilterSpec>,
    },
    SearchVectorStore {
        query: String,
        n_results: usize,
    },
    GetUserContext,
    /// Loop sentinel — handled by the agent loop itself, never by a handler.
    TerminateTask {
        reason: Option<String>,
        result: Option<Value>,
        conclusion: String,
    },
    Lpt {
        kind: WorkerKind,
        inputs: LptInputs,
    },
}

impl AgentTool {
    /// Decode a raw `(name, arguments)` call. Unknown names and malformed
    /// arguments come back as `Err` with a message the dispatcher feeds to
    /// the model as a tool error.
    pub fn decode(name: &str, arguments: &Value) -> Result<Self, String> {
        match name {
            TOOL_GET_STRUCTURED_DATA => {
                let path = require_str(arguments, "path")?;
                let filters = match arguments.get("filters") {
                    Some(v) if !v.is_null() => serde_json::from_value(v.clone())
                        .map_err(|e| format!("invalid filters: {e}"))?,
                    _ => Vec::new(),
                };
                Ok(Self::GetStructuredData { path, filters })
            }
            TOOL_SEARCH_VECTOR_STORE => {
                let query = require_str(arguments, "query")?;
                let n_results = arguments
                    .get("n_results")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(5) as usize;
                Ok(Self::SearchVectorStore { query, n_results })
            }
            TOOL_GET_USER_CONTEXT => Ok(Self::GetUserContext),
            TOOL_TERMINATE_TASK => Ok(Self::TerminateTask {
                reason: arguments
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                result: arguments.get("result").filter(|v| !v.is_null()).cloned(),
                conclusion: arguments
                    .get("conclusion")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => match WorkerKind::from_tool_name(other) {
                Some(kind) => {
                    let inputs: LptInputs = serde_json::from_value(arguments.clone())
                        .map_err(|e| format!("invalid {other} arguments: {e}"))?;
                    Ok(Self::Lpt { kind, inputs })
                }
                None => Err(format!("unknown tool: '{other}'")),
            },
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::TerminateTask { .. })
    }
}

fn require_str(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| format!("missing required argument: {key}"))
}
