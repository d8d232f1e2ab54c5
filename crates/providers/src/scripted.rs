//! Scripted provider — a deterministic [`LlmProvider`] for tests and
//! local demos. Each call pops the next scripted turn; an exhausted
//! script yields empty responses.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use fiscus_domain::error::{Error, Result};
use fiscus_domain::stream::{BoxStream, StreamEvent, Usage};
use fiscus_domain::tool::ToolCall;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// When set, the call fails with this message instead of responding.
    pub fail: Option<String>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn tool(name: impl Into<String>, arguments: Value) -> Self {
        Self::default().with_tool(name, arguments)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, arguments: Value) -> Self {
        let call_id = format!("call_{}", self.tool_calls.len() + 1);
        self.tool_calls.push(ToolCall {
            call_id,
            tool_name: name.into(),
            arguments,
        });
        self
    }

    pub fn with_usage(mut self, prompt: u32, completion: u32) -> Self {
        self.usage = Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        });
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            ..Default::default()
        }
    }

    /// Shorthand for the terminate sentinel with a conclusion.
    pub fn terminate(conclusion: impl Into<String>) -> Self {
        Self::tool(
            fiscus_domain::tool::TOOL_TERMINATE_TASK,
            serde_json::json!({"reason": "mission_complete", "conclusion": conclusion.into()}),
        )
    }
}

/// Deterministic provider driven by a queue of [`ScriptedTurn`]s.
#[derive(Default)]
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append more turns to the script.
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().push_back(turn);
    }

    /// Every request seen so far, in call order.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().len()
    }

    fn next_turn(&self, req: &ChatRequest) -> ScriptedTurn {
        self.requests.lock().push(req.clone());
        self.turns.lock().pop_front().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let turn = self.next_turn(&req);
        if let Some(message) = turn.fail {
            return Err(Error::Llm {
                provider: "scripted".into(),
                message,
            });
        }
        let finish_reason = if turn.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };
        Ok(ChatResponse {
            content: turn.text,
            tool_calls: turn.tool_calls,
            usage: turn.usage,
            model: "scripted".into(),
            finish_reason: Some(finish_reason.into()),
        })
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let turn = self.next_turn(&req);
        let stream = async_stream::stream! {
            if let Some(message) = turn.fail {
                yield Ok(StreamEvent::Error { message });
                return;
            }
            // Emit the text in two chunks so consumers exercise
            // accumulation.
            if !turn.text.is_empty() {
                let mid = turn.text.len() / 2;
                let mut split = mid;
                while !turn.text.is_char_boundary(split) {
                    split += 1;
                }
                let (a, b) = turn.text.split_at(split);
                if !a.is_empty() {
                    yield Ok(StreamEvent::Token { text: a.to_owned() });
                }
                if !b.is_empty() {
                    yield Ok(StreamEvent::Token { text: b.to_owned() });
                }
            }
            for call in turn.tool_calls {
                yield Ok(StreamEvent::ToolCallStarted {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                });
                yield Ok(StreamEvent::ToolCallFinished {
                    call_id: call.call_id,
                    tool_name: call.tool_name,
                    arguments: call.arguments,
                });
            }
            yield Ok(StreamEvent::Done {
                usage: turn.usage,
                finish_reason: Some("stop".into()),
            });
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}
