//! Tool registry for the runtime — the definitions exposed to the LLM and
//! the dispatcher that routes decoded calls to short-process handlers or
//! the long-process client.
//!
//! Long-process definitions are deliberately minimal: identifiers and
//! instructions only. The wire payload is assembled server-side from the
//! thread context, so nothing the model emits can forge credentials or
//! routing.

use serde_json::{json, Value};

use fiscus_domain::tool::{
    AgentTool, ToolDefinition, WorkerKind, TOOL_GET_STRUCTURED_DATA, TOOL_GET_USER_CONTEXT,
    TOOL_SEARCH_VECTOR_STORE, TOOL_TERMINATE_TASK,
};
use fiscus_domain::context::ThreadContext;

use super::brain::Brain;
use super::{lpt, spt};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full set of tool definitions exposed to the LLM.
pub fn definitions() -> Vec<ToolDefinition> {
    let mut defs = vec![
        ToolDefinition {
            name: TOOL_GET_STRUCTURED_DATA.into(),
            description: "Read business records (invoices, mandates, settings) from the \
                          document store, with optional field filters."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Document or collection path" },
                    "filters": {
                        "type": "array",
                        "description": "Field predicates applied to collection reads",
                        "items": {
                            "type": "object",
                            "properties": {
                                "field": { "type": "string" },
                                "op": { "type": "string", "enum": ["eq", "ne", "gt", "gte", "lt", "lte", "contains"] },
                                "value": {}
                            },
                            "required": ["field", "value"]
                        }
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: TOOL_SEARCH_VECTOR_STORE.into(),
            description: "Semantic search over the knowledge base.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "n_results": { "type": "integer", "description": "Max results (default 5)" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: TOOL_GET_USER_CONTEXT.into(),
            description: "The business context of this conversation: company, mandate, \
                          ERP, document system."
                .into(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: TOOL_TERMINATE_TASK.into(),
            description: "End the mission. Call this exactly once, when the user's request \
                          is fully handled, with a final conclusion for the user."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why the mission ends" },
                    "result": { "type": "object", "description": "Optional structured result" },
                    "conclusion": { "type": "string", "description": "Final message shown to the user" }
                },
                "required": ["conclusion"]
            }),
        },
    ];

    for kind in WorkerKind::all() {
        defs.push(lpt_definition(kind));
    }
    defs
}

/// Minimal model-facing schema for one worker kind: ids + instructions.
fn lpt_definition(kind: WorkerKind) -> ToolDefinition {
    let (description, properties) = match kind {
        WorkerKind::ApBookkeeper => (
            "Book accounts-payable invoices through the bookkeeping worker. \
             Runs in the background; you will be resumed with the result.",
            json!({
                "invoice_ids": { "type": "array", "items": { "type": "string" }, "description": "Invoice ids to book" },
                "instructions": { "type": "string", "description": "Free-text guidance for the worker" }
            }),
        ),
        WorkerKind::Router => (
            "Route a document from the drive to its destination workflow. \
             Runs in the background; you will be resumed with the result.",
            json!({
                "drive_file_id": { "type": "string", "description": "Drive file to route" },
                "instructions": { "type": "string", "description": "Free-text guidance for the worker" }
            }),
        ),
        WorkerKind::BankReconciler => (
            "Reconcile bank transactions against open items. Runs in the \
             background; you will be resumed with the result.",
            json!({
                "transaction_ids": { "type": "array", "items": { "type": "string" }, "description": "Transaction ids to reconcile" },
                "instructions": { "type": "string", "description": "Free-text guidance for the worker" }
            }),
        ),
    };
    ToolDefinition {
        name: kind.tool_name().into(),
        description: description.into(),
        parameters: json!({ "type": "object", "properties": properties }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one tool call produced.
#[derive(Debug)]
pub enum ToolOutcome {
    /// Synchronous result, folded into the next turn's input.
    Result { content: String, is_error: bool },
    /// A long-process task was accepted; the loop suspends.
    LptQueued { task_id: String, summary: String },
}

/// Execute one decoded tool call. The terminate sentinel never reaches
/// here; the loop short-circuits on it.
pub async fn dispatch(
    state: &AppState,
    context: &ThreadContext,
    user_id: &str,
    company_id: &str,
    brain: &mut Brain,
    tool: AgentTool,
) -> ToolOutcome {
    match tool {
        AgentTool::GetStructuredData { path, filters } => {
            result(spt::get_structured_data(state, &path, &filters).await)
        }
        AgentTool::SearchVectorStore { query, n_results } => {
            result(spt::search_vector_store(state, &query, n_results).await)
        }
        AgentTool::GetUserContext => result(spt::user_context(context)),
        AgentTool::TerminateTask { .. } => {
            debug_assert!(false, "terminate is handled by the loop");
            ToolOutcome::Result {
                content: json!({"success": false, "error": "TERMINATE_TASK is not a handler tool"})
                    .to_string(),
                is_error: true,
            }
        }
        AgentTool::Lpt { kind, inputs } => {
            match lpt::launch(
                state,
                context,
                user_id,
                company_id,
                &brain.thread_key,
                kind,
                &inputs,
                None,
            )
            .await
            {
                Ok(launch) => {
                    brain.add_task(&launch.task_id);
                    ToolOutcome::LptQueued {
                        task_id: launch.task_id,
                        summary: launch.summary,
                    }
                }
                Err(e) => ToolOutcome::Result {
                    content: json!({"success": false, "error": e.to_string()}).to_string(),
                    is_error: true,
                },
            }
        }
    }
}

fn result(value: Value) -> ToolOutcome {
    let is_error = value.get("success") == Some(&Value::Bool(false));
    ToolOutcome::Result {
        content: value.to_string(),
        is_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit;
    use fiscus_domain::tool::LptInputs;

    #[test]
    fn definitions_cover_every_tool() {
        let defs = definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"GET_STRUCTURED_DATA"));
        assert!(names.contains(&"SEARCH_VECTOR_STORE"));
        assert!(names.contains(&"GET_USER_CONTEXT"));
        assert!(names.contains(&"TERMINATE_TASK"));
        assert!(names.contains(&"LPT_APBookkeeper"));
        assert!(names.contains(&"LPT_Router"));
        assert!(names.contains(&"LPT_BankReconciler"));
    }

    #[test]
    fn lpt_schemas_expose_only_ids_and_instructions() {
        for kind in WorkerKind::all() {
            let def = lpt_definition(kind);
            let properties = def.parameters["properties"].as_object().unwrap();
            for key in properties.keys() {
                assert!(
                    ["invoice_ids", "transaction_ids", "drive_file_id", "instructions"]
                        .contains(&key.as_str()),
                    "unexpected model-visible field {key} on {kind}"
                );
            }
        }
    }

    #[tokio::test]
    async fn get_user_context_returns_the_loaded_context() {
        let state = testkit::state();
        let context = testkit::ready_context("c1");
        let mut brain = Brain::new("t1");

        let outcome = dispatch(&state, &context, "u1", "c1", &mut brain, AgentTool::GetUserContext)
            .await;
        match outcome {
            ToolOutcome::Result { content, is_error } => {
                assert!(!is_error);
                assert!(content.contains("qonto"));
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lpt_dispatch_records_active_task() {
        let state = testkit::state();
        let context = testkit::ready_context("c1");
        let mut brain = Brain::new("t1");

        let outcome = dispatch(
            &state,
            &context,
            "u1",
            "c1",
            &mut brain,
            AgentTool::Lpt {
                kind: WorkerKind::ApBookkeeper,
                inputs: LptInputs {
                    invoice_ids: vec!["i1".into()],
                    ..Default::default()
                },
            },
        )
        .await;

        match outcome {
            ToolOutcome::LptQueued { task_id, .. } => {
                assert!(brain.has_task(&task_id));
            }
            other => panic!("expected LptQueued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_lpt_dispatch_is_a_tool_error_not_a_suspension() {
        let state = testkit::state();
        state.seeded_workers.fail_next("down");
        let context = testkit::ready_context("c1");
        let mut brain = Brain::new("t1");

        let outcome = dispatch(
            &state,
            &context,
            "u1",
            "c1",
            &mut brain,
            AgentTool::Lpt {
                kind: WorkerKind::ApBookkeeper,
                inputs: LptInputs::default(),
            },
        )
        .await;

        match outcome {
            ToolOutcome::Result { is_error, .. } => assert!(is_error),
            other => panic!("expected Result, got {other:?}"),
        }
        assert_eq!(brain.active_task_count(), 0);
    }
}
