//! Agent loop — drives one user message (or one callback continuation)
//! to completion or suspension.
//!
//! Two nested loops: the outer iteration retries a mission whose inner
//! loop ran out of turns, re-seeding the input with the previous
//! iteration's report; the inner loop issues one model call per turn,
//! classifies the response blocks, and dispatches tools. Short-process
//! results fold into the next turn's input; an accepted long-process
//! dispatch suspends the loop, to be resumed by the worker's callback.

use futures_util::StreamExt;

use fiscus_domain::chat::Message;
use fiscus_domain::context::ThreadContext;
use fiscus_domain::error::{Error, Result};
use fiscus_domain::stream::StreamEvent;
use fiscus_domain::tool::AgentTool;
use fiscus_providers::traits::{collect_stream_events, ChatRequest, ChatResponse};

use super::brain::{Brain, BrainState};
use super::presence::ConnectionMode;
use super::registry::Session;
use super::{bus, context, tools};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status & outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Terminal status of one loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// TERMINATE_TASK seen; history flushed.
    MissionCompleted,
    /// Inner turn budget exhausted (outer loop may retry).
    MaxTurnsReached,
    /// A long-process task was accepted; the brain is suspended.
    LptInProgress,
    /// Text-only turn: a clarification for the user; history kept.
    TextOutput,
    /// Empty response or provider failure; history kept.
    NoIaAction,
    /// Unrecoverable error; history flushed.
    ErrorFatal,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    pub text: String,
}

impl LoopOutcome {
    fn new(status: LoopStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }
}

/// Input to one loop invocation.
pub struct LoopRequest {
    pub user_id: String,
    pub company_id: String,
    pub thread_key: String,
    pub initial_query: String,
    pub mode: ConnectionMode,
    /// Set by the callback resumer: the task id whose result this
    /// continuation carries, removed from the brain's active set under
    /// the thread lock.
    pub resume_task: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the agent loop for one message. Serialized per thread: user turns
/// and callback resumptions queue on the same brain mutex.
pub async fn run(state: &AppState, request: LoopRequest) -> LoopOutcome {
    let session = state
        .registry
        .get_or_create(&request.user_id, &request.company_id);
    let brain_arc = session.brain(&request.thread_key);
    let mut brain = brain_arc.lock().await;

    if let Some(task_id) = &request.resume_task {
        brain.remove_task(task_id);
    }
    if brain.history().is_empty() {
        brain.original_query = request.initial_query.clone();
    }
    brain.state = BrainState::Running;

    let context = match context::load(state, &session, &request.thread_key).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(thread_key = %request.thread_key, error = %e, "context load failed");
            brain.clear_history();
            brain.state = BrainState::Failed;
            let text = "Your business configuration could not be loaded; please contact support.";
            persist_outcome(state, &request, LoopStatus::ErrorFatal, text).await;
            return LoopOutcome::new(LoopStatus::ErrorFatal, text);
        }
    };

    let outcome = run_iterations(state, &session, &mut brain, &context, &request).await;

    brain.state = match outcome.status {
        LoopStatus::MissionCompleted => BrainState::Completed,
        LoopStatus::LptInProgress => BrainState::Suspended,
        LoopStatus::ErrorFatal => BrainState::Failed,
        LoopStatus::MaxTurnsReached
        | LoopStatus::TextOutput
        | LoopStatus::NoIaAction => BrainState::Idle,
    };
    tracing::info!(
        thread_key = %request.thread_key,
        status = ?outcome.status,
        active_tasks = brain.active_task_count(),
        "loop finished"
    );
    drop(brain);

    let user_text = match outcome.status {
        LoopStatus::MaxTurnsReached => {
            "This task needs more steps than one pass allows. Please narrow the scope or split \
             the request."
                .to_owned()
        }
        _ => outcome.text.clone(),
    };
    persist_outcome(state, &request, outcome.status, &user_text).await;
    outcome
}

async fn persist_outcome(state: &AppState, request: &LoopRequest, status: LoopStatus, text: &str) {
    let persisted = if status == LoopStatus::ErrorFatal {
        bus::persist_assistant_error(
            state,
            &request.user_id,
            &request.company_id,
            &request.thread_key,
            text,
            request.mode,
        )
        .await
    } else {
        bus::persist_assistant(
            state,
            &request.user_id,
            &request.company_id,
            &request.thread_key,
            text,
            request.mode,
        )
        .await
    };
    if let Err(e) = persisted {
        tracing::warn!(thread_key = %request.thread_key, error = %e, "failed to persist reply");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outer iterations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_iterations(
    state: &AppState,
    session: &Session,
    brain: &mut Brain,
    context: &ThreadContext,
    request: &LoopRequest,
) -> LoopOutcome {
    let max_iterations = state.config.agent.max_iterations;
    let mut current_input = request.initial_query.clone();
    let mut last = LoopOutcome::new(LoopStatus::NoIaAction, "");

    for iteration in 0..max_iterations {
        let outcome = run_turns(state, session, brain, context, request, &current_input).await;
        match outcome.status {
            LoopStatus::MaxTurnsReached if iteration + 1 < max_iterations => {
                tracing::debug!(
                    thread_key = %request.thread_key,
                    iteration,
                    "turn budget exhausted, retrying with summary-seeded input"
                );
                current_input = format!(
                    "PREVIOUS ITERATION REPORT:\n{}\n\nORIGINAL QUERY:\n{}",
                    outcome.text, request.initial_query
                );
                last = outcome;
            }
            _ => return outcome,
        }
    }
    last
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inner turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) async fn run_turns(
    state: &AppState,
    session: &Session,
    brain: &mut Brain,
    context: &ThreadContext,
    request: &LoopRequest,
    current_input: &str,
) -> LoopOutcome {
    let cfg = &state.config.agent;
    let mut input = current_input.to_owned();
    let mut last_activity = String::new();

    for turn in 0..cfg.max_turns {
        // Budget check runs before the call: at or beyond the budget the
        // history is summarized and reseeded, invisibly to the user.
        if brain.estimated_tokens() >= cfg.token_budget {
            self_heal(session, brain).await;
        }

        brain.push(Message::user(&input));

        let response = match call_model(state, session, brain, request).await {
            Ok(r) => r,
            // Provider-side failures (API error, network, timeout) cost
            // this turn, never the conversation.
            Err(e @ (Error::Llm { .. } | Error::Http(_) | Error::Timeout(_))) => {
                tracing::warn!(thread_key = %request.thread_key, turn, error = %e, "provider failure");
                return LoopOutcome::new(
                    LoopStatus::NoIaAction,
                    "I hit a temporary issue reaching the assistant. Please try again shortly.",
                );
            }
            Err(e) => {
                tracing::error!(thread_key = %request.thread_key, turn, error = %e, "turn failed");
                brain.clear_history();
                return LoopOutcome::new(
                    LoopStatus::ErrorFatal,
                    "Something went wrong while processing your request.",
                );
            }
        };

        if response.is_empty() {
            return LoopOutcome::new(
                LoopStatus::NoIaAction,
                "I hit a temporary issue reaching the assistant. Please try again shortly.",
            );
        }

        brain.push(assistant_history_entry(&response));

        // Terminate short-circuits everything else in the turn.
        for call in &response.tool_calls {
            if let Ok(AgentTool::TerminateTask {
                reason,
                result,
                conclusion,
            }) = AgentTool::decode(&call.tool_name, &call.arguments)
            {
                brain.clear_history();
                let text = conclusion_text(conclusion, reason, result, &response.content);
                return LoopOutcome::new(LoopStatus::MissionCompleted, text);
            }
        }

        // Text-only turn: the model is asking the caller something.
        if response.tool_calls.is_empty() {
            return LoopOutcome::new(LoopStatus::TextOutput, response.content.clone());
        }

        // Dispatch each tool in emission order.
        let mut results = Vec::new();
        for call in &response.tool_calls {
            let outcome = match AgentTool::decode(&call.tool_name, &call.arguments) {
                Ok(tool) => {
                    tools::dispatch(
                        state,
                        context,
                        &request.user_id,
                        &request.company_id,
                        brain,
                        tool,
                    )
                    .await
                }
                Err(message) => tools::ToolOutcome::Result {
                    content: serde_json::json!({"success": false, "error": message}).to_string(),
                    is_error: true,
                },
            };

            match outcome {
                tools::ToolOutcome::LptQueued { task_id, summary } => {
                    brain.push(Message::assistant(format!(
                        "[background task {task_id} queued: {summary}]"
                    )));
                    return LoopOutcome::new(
                        LoopStatus::LptInProgress,
                        format!("⏳ {summary} — I remain available."),
                    );
                }
                tools::ToolOutcome::Result { content, is_error } => {
                    if is_error {
                        tracing::debug!(tool = %call.tool_name, "tool returned an error result");
                    }
                    results.push(format!(
                        "Result {}: {}",
                        call.tool_name,
                        truncate_str(&content, cfg.tool_result_max_chars)
                    ));
                }
            }
        }

        // Fold results (and any interleaved reasoning) into the next input.
        last_activity = results.join("\n");
        let mut next = String::new();
        if !response.content.trim().is_empty() {
            next.push_str("PRIOR REASONING:\n");
            next.push_str(response.content.trim());
            next.push_str("\n\n");
        }
        next.push_str(&last_activity);
        next.push_str("\n\nContinue the mission with these results, or call TERMINATE_TASK once complete.");
        input = next;
    }

    let report = if last_activity.is_empty() {
        format!("Turn budget of {} exhausted with no tool activity.", cfg.max_turns)
    } else {
        format!(
            "Turn budget of {} exhausted. Last tool activity:\n{}",
            cfg.max_turns, last_activity
        )
    };
    LoopOutcome::new(LoopStatus::MaxTurnsReached, report)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model call over the brain's history, live-forwarding text chunks
/// in UI mode.
async fn call_model(
    state: &AppState,
    session: &Session,
    brain: &Brain,
    request: &LoopRequest,
) -> Result<ChatResponse> {
    let mut messages = Vec::with_capacity(brain.history().len() + 1);
    messages.push(Message::system(&session.system_prompt));
    messages.extend(brain.history().iter().cloned());

    let chat_request = ChatRequest {
        messages,
        tools: tools::definitions(),
        temperature: Some(0.2),
        max_tokens: None,
        model: None,
    };

    let mut stream = session.llm.chat_stream(chat_request).await?;
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event?;
        match &event {
            StreamEvent::Token { text } => {
                bus::emit_chunk(state, &request.user_id, &request.thread_key, text, request.mode);
            }
            StreamEvent::Error { message } => {
                return Err(Error::Llm {
                    provider: session.llm.provider_id().to_owned(),
                    message: message.clone(),
                });
            }
            _ => {}
        }
        events.push(event);
    }
    Ok(collect_stream_events(events, session.llm.provider_id()))
}

/// Summarize-and-reseed: collapse the history into a summary seed so the
/// next turn starts inside the budget. Falls back to a mechanical
/// truncation when the summarizer call fails.
async fn self_heal(session: &Session, brain: &mut Brain) {
    let rendered = render_history(brain.history());
    let prompt = format!(
        "Summarize this assistant mission transcript. Preserve the goal, decisions taken, \
         tool results that still matter, and any open follow-ups. Be concise.\n\n{rendered}"
    );
    let summary = match session
        .llm
        .chat(ChatRequest {
            messages: vec![Message::user(prompt)],
            temperature: Some(0.1),
            max_tokens: Some(1500),
            ..Default::default()
        })
        .await
    {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content,
        Ok(_) => truncate_str(&rendered, 4000),
        Err(e) => {
            tracing::warn!(error = %e, "summarizer failed, truncating history instead");
            truncate_str(&rendered, 4000)
        }
    };

    let turns_before = brain.history_len();
    brain.reseed(Message::user(format!(
        "PRIOR CONVERSATION SUMMARY: {summary}\nCURRENT QUERY: {}",
        brain.original_query
    )));
    tracing::info!(
        thread_key = %brain.thread_key,
        turns_before,
        "history summarized and reseeded"
    );
}

fn assistant_history_entry(response: &ChatResponse) -> Message {
    let calls: Vec<&str> = response
        .tool_calls
        .iter()
        .map(|c| c.tool_name.as_str())
        .collect();
    let text = match (response.content.trim().is_empty(), calls.is_empty()) {
        (false, true) => response.content.clone(),
        (false, false) => format!("{}\n[tool calls: {}]", response.content, calls.join(", ")),
        (true, false) => format!("[tool calls: {}]", calls.join(", ")),
        (true, true) => String::new(),
    };
    Message::assistant(text)
}

fn conclusion_text(
    conclusion: String,
    reason: Option<String>,
    result: Option<serde_json::Value>,
    turn_text: &str,
) -> String {
    if !conclusion.trim().is_empty() {
        return conclusion;
    }
    if let Some(result) = result {
        return result.to_string();
    }
    if !turn_text.trim().is_empty() {
        return turn_text.trim().to_owned();
    }
    reason.unwrap_or_else(|| "Mission completed.".to_owned())
}

fn render_history(history: &[Message]) -> String {
    let mut out = String::new();
    for message in history {
        let role = match message.role {
            fiscus_domain::chat::Role::System => "System",
            fiscus_domain::chat::Role::User => "User",
            fiscus_domain::chat::Role::Assistant => "Assistant",
            fiscus_domain::chat::Role::Tool => "Tool",
        };
        out.push_str(role);
        out.push_str(": ");
        out.push_str(&message.content.extract_all_text());
        out.push('\n');
    }
    out
}

pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit;
    use fiscus_providers::scripted::ScriptedTurn;
    use serde_json::json;

    fn request(query: &str) -> LoopRequest {
        LoopRequest {
            user_id: "u1".into(),
            company_id: "c1".into(),
            thread_key: "t1".into(),
            initial_query: query.into(),
            mode: ConnectionMode::Backend,
            resume_task: None,
        }
    }

    #[tokio::test]
    async fn terminate_completes_mission_and_flushes_history() {
        let state = testkit::state_with_script([
            ScriptedTurn::tool("GET_USER_CONTEXT", json!({})),
            ScriptedTurn::terminate("You use Qonto."),
        ]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("What ERP do I use?")).await;
        assert_eq!(outcome.status, LoopStatus::MissionCompleted);
        assert_eq!(outcome.text, "You use Qonto.");

        let session = state.registry.get("u1", "c1").unwrap();
        let brain = session.brain("t1");
        let brain = brain.lock().await;
        assert_eq!(brain.history_len(), 0);
        assert_eq!(brain.state, BrainState::Completed);
    }

    #[tokio::test]
    async fn text_only_turn_is_a_clarification_and_keeps_history() {
        let state = testkit::state_with_script([ScriptedTurn::text(
            "Which quarter do you mean?",
        )]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("File the VAT return")).await;
        assert_eq!(outcome.status, LoopStatus::TextOutput);
        assert_eq!(outcome.text, "Which quarter do you mean?");

        let session = state.registry.get("u1", "c1").unwrap();
        let brain = session.brain("t1");
        let brain = brain.lock().await;
        assert!(brain.history_len() > 0);
        assert_eq!(brain.state, BrainState::Idle);
    }

    #[tokio::test]
    async fn lpt_dispatch_suspends_without_flushing() {
        let state = testkit::state_with_script([ScriptedTurn::tool(
            "LPT_APBookkeeper",
            json!({"invoice_ids": ["i1", "i2"]}),
        )]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("Book invoices i1,i2")).await;
        assert_eq!(outcome.status, LoopStatus::LptInProgress);
        assert_eq!(outcome.text, "⏳ Booking started for 2 invoices — I remain available.");

        let session = state.registry.get("u1", "c1").unwrap();
        let brain = session.brain("t1");
        let brain = brain.lock().await;
        assert_eq!(brain.state, BrainState::Suspended);
        assert_eq!(brain.active_task_count(), 1);
        assert!(brain.history_len() > 0);
    }

    #[tokio::test]
    async fn empty_response_is_no_action() {
        let state = testkit::state_with_script([]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("hello")).await;
        assert_eq!(outcome.status, LoopStatus::NoIaAction);
        assert!(!outcome.text.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_no_action_and_history_survives() {
        let state = testkit::state_with_script([ScriptedTurn::failing("overloaded")]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("hello")).await;
        assert_eq!(outcome.status, LoopStatus::NoIaAction);

        let session = state.registry.get("u1", "c1").unwrap();
        let brain = session.brain("t1");
        let brain = brain.lock().await;
        assert!(brain.history_len() > 0, "NoIaAction must not flush history");
    }

    #[tokio::test]
    async fn inner_loop_stops_exactly_at_max_turns() {
        // Script one lookup turn more than the budget; the loop must stop
        // at the budget, not one past it.
        let mut state = testkit::state_with_script(
            (0..10).map(|_| ScriptedTurn::tool("GET_USER_CONTEXT", json!({}))),
        );
        let mut config = testkit::test_config();
        config.agent.max_turns = 4;
        config.agent.max_iterations = 1;
        state.config = std::sync::Arc::new(config);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("loop forever")).await;
        assert_eq!(outcome.status, LoopStatus::MaxTurnsReached);
        assert!(!outcome.text.is_empty(), "max-turns report must be non-empty");
        // 10 scripted turns, 4 consumed: the loop did not over-run by one.
        assert_eq!(state.seeded_llm.remaining_turns(), 6);
    }

    #[tokio::test]
    async fn outer_loop_retries_after_max_turns() {
        // Iteration 1 burns 2 turns on lookups; iteration 2 terminates.
        let mut state = testkit::state_with_script([
            ScriptedTurn::tool("GET_USER_CONTEXT", json!({})),
            ScriptedTurn::tool("GET_USER_CONTEXT", json!({})),
            ScriptedTurn::terminate("Done on retry."),
        ]);
        let mut config = testkit::test_config();
        config.agent.max_turns = 2;
        config.agent.max_iterations = 2;
        state.config = std::sync::Arc::new(config);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("original query")).await;
        assert_eq!(outcome.status, LoopStatus::MissionCompleted);
        assert_eq!(outcome.text, "Done on retry.");

        // The retry input carried the report and restated the original.
        let requests = state.seeded_llm.recorded_requests();
        let retry_input = requests[2]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == fiscus_domain::chat::Role::User)
            .unwrap()
            .content
            .extract_all_text();
        assert!(retry_input.contains("PREVIOUS ITERATION REPORT"));
        assert!(retry_input.contains("original query"));
    }

    #[tokio::test]
    async fn token_budget_triggers_reseed_before_the_turn() {
        let mut state = testkit::state_with_script([
            ScriptedTurn::text("summary of everything so far"), // summarizer call
            ScriptedTurn::terminate("done"),
        ]);
        let mut config = testkit::test_config();
        config.agent.token_budget = 100;
        state.config = std::sync::Arc::new(config);
        testkit::seed_profile(&state, "u1", "c1").await;

        // Pre-load the brain past the budget.
        {
            let session = state.registry.get_or_create("u1", "c1");
            let brain = session.brain("t1");
            let mut brain = brain.lock().await;
            brain.original_query = "the original question".into();
            for _ in 0..6 {
                brain.push(Message::user("x".repeat(400)));
            }
            assert!(brain.estimated_tokens() >= 100);
        }

        let outcome = run(&state, request("continue")).await;
        assert_eq!(outcome.status, LoopStatus::MissionCompleted);

        // The terminate call saw a reseeded history: summary seed + the
        // turn input, instead of the six bulk messages.
        let requests = state.seeded_llm.recorded_requests();
        let final_request = requests.last().unwrap();
        assert!(final_request.messages.len() <= 3);
        let seed = final_request.messages[1].content.extract_all_text();
        assert!(seed.starts_with("PRIOR CONVERSATION SUMMARY: summary of everything so far"));
        assert!(seed.contains("CURRENT QUERY:"));
    }

    #[tokio::test]
    async fn budget_triggers_at_exactly_the_limit() {
        // One 400-char message estimates to exactly 104 tokens; with the
        // budget at 104 the reseed must fire (at-or-beyond, not beyond).
        let mut state = testkit::state_with_script([
            ScriptedTurn::text("tight summary"),
            ScriptedTurn::terminate("done"),
        ]);
        let mut config = testkit::test_config();
        config.agent.token_budget = 104;
        state.config = std::sync::Arc::new(config);
        testkit::seed_profile(&state, "u1", "c1").await;

        {
            let session = state.registry.get_or_create("u1", "c1");
            let brain = session.brain("t1");
            let mut brain = brain.lock().await;
            brain.push(Message::user("x".repeat(400)));
            assert_eq!(brain.estimated_tokens(), 104);
        }

        run(&state, request("go")).await;

        let requests = state.seeded_llm.recorded_requests();
        let first = requests[0].messages[0].content.extract_all_text();
        assert!(
            first.starts_with("Summarize"),
            "summarizer must run before the turn at exactly the budget"
        );
    }

    #[tokio::test]
    async fn mixed_text_and_tools_feeds_reasoning_forward() {
        let state = testkit::state_with_script([
            ScriptedTurn::tool("GET_USER_CONTEXT", json!({}))
                .with_text("Let me check the ERP first."),
            ScriptedTurn::terminate("done"),
        ]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("check things")).await;
        assert_eq!(outcome.status, LoopStatus::MissionCompleted);

        let requests = state.seeded_llm.recorded_requests();
        let second_input = requests[1]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == fiscus_domain::chat::Role::User)
            .unwrap()
            .content
            .extract_all_text();
        assert!(second_input.contains("PRIOR REASONING:"));
        assert!(second_input.contains("Let me check the ERP first."));
        assert!(second_input.contains("Result GET_USER_CONTEXT:"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_error_result_and_loop_continues() {
        let state = testkit::state_with_script([
            ScriptedTurn::tool("NOT_A_TOOL", json!({})),
            ScriptedTurn::terminate("recovered"),
        ]);
        testkit::seed_profile(&state, "u1", "c1").await;

        let outcome = run(&state, request("try something odd")).await;
        assert_eq!(outcome.status, LoopStatus::MissionCompleted);
        assert_eq!(outcome.text, "recovered");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 5), "hello...");
        // 2-byte character at the cut point.
        assert_eq!(truncate_str("héllo", 2), "h...");
    }

    #[test]
    fn conclusion_falls_back_through_result_text_reason() {
        assert_eq!(
            conclusion_text("Final.".into(), None, None, ""),
            "Final."
        );
        assert_eq!(
            conclusion_text(String::new(), None, Some(json!({"ok": true})), ""),
            "{\"ok\":true}"
        );
        assert_eq!(
            conclusion_text(String::new(), None, None, "turn text"),
            "turn text"
        );
        assert_eq!(
            conclusion_text(String::new(), Some("done".into()), None, ""),
            "done"
        );
        assert_eq!(
            conclusion_text(String::new(), None, None, ""),
            "Mission completed."
        );
    }
}
