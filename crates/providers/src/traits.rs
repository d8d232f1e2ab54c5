use fiscus_domain::chat::Message;
use fiscus_domain::error::Result;
use fiscus_domain::stream::{BoxStream, StreamEvent, Usage};
use fiscus_domain::tool::{ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. `None` uses the provider default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// A turn with neither text nor tool calls — the loop treats this as
    /// "no action taken".
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements. Adapters translate between the
/// internal types and each provider's wire format.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(&self, req: ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

/// Collapse a stream-event sequence into a [`ChatResponse`]. Shared by
/// adapters that implement `chat` on top of `chat_stream` and by callers
/// that want the aggregate after live-forwarding chunks.
pub fn collect_stream_events(events: Vec<StreamEvent>, model: &str) -> ChatResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    let mut finish_reason = None;

    for event in events {
        match event {
            StreamEvent::Token { text } => content.push_str(&text),
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => tool_calls.push(ToolCall {
                call_id,
                tool_name,
                arguments,
            }),
            StreamEvent::Done {
                usage: u,
                finish_reason: f,
            } => {
                usage = u;
                finish_reason = f;
            }
            _ => {}
        }
    }

    ChatResponse {
        content,
        tool_calls,
        usage,
        model: model.to_owned(),
        finish_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_assembles_text_tools_and_usage() {
        let events = vec![
            StreamEvent::Token { text: "Hel".into() },
            StreamEvent::Token { text: "lo".into() },
            StreamEvent::ToolCallFinished {
                call_id: "c1".into(),
                tool_name: "GET_USER_CONTEXT".into(),
                arguments: json!({}),
            },
            StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                finish_reason: Some("tool_calls".into()),
            },
        ];
        let resp = collect_stream_events(events, "m1");
        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.tool_calls.len(), 1);
        assert!(!resp.is_empty());
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_response_detected() {
        let resp = collect_stream_events(
            vec![StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }],
            "m1",
        );
        assert!(resp.is_empty());
    }
}
