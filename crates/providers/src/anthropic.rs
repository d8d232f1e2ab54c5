//! Anthropic Messages API adapter — tool use and SSE streaming. System
//! messages go in the top-level `system` field; tool results travel as
//! user messages with `tool_result` content blocks.

use serde_json::Value;

use fiscus_domain::chat::{ContentPart, Message, MessageContent, Role};
use fiscus_domain::config::LlmConfig;
use fiscus_domain::error::{Error, Result};
use fiscus_domain::stream::{BoxStream, StreamEvent, Usage};
use fiscus_domain::tool::{ToolCall, ToolDefinition};

use crate::sse;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Build the adapter from config; the API key is read from the
    /// configured environment variable.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| Error::Config(format!("environment variable {} is not set", cfg.api_key_env)))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_model: cfg.default_model.clone(),
            client,
        })
    }

    fn request(&self, stream: bool, req: &ChatRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&build_body(req, &self.default_model, stream))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_body(req: &ChatRequest, default_model: &str, stream: bool) -> Value {
    let model = req.model.clone().unwrap_or_else(|| default_model.to_owned());

    let mut system_parts: Vec<String> = Vec::new();
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.extract_all_text()),
            Role::User => api_messages.push(serde_json::json!({
                "role": "user",
                "content": msg.content.extract_all_text(),
            })),
            Role::Assistant => api_messages.push(assistant_to_wire(msg)),
            Role::Tool => api_messages.push(tool_result_to_wire(msg)),
        }
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": api_messages,
        "stream": stream,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_wire).collect());
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    body
}

fn assistant_to_wire(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => {
                    Some(serde_json::json!({"type": "text", "text": text}))
                }
                ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                })),
                ContentPart::ToolResult { .. } => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "assistant", "content": content})
}

fn tool_result_to_wire(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "type": "tool_result",
            "tool_use_id": "",
            "content": t,
        })],
    };
    serde_json::json!({"role": "user", "content": content})
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(body: &Value) -> ChatResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    if let Some(blocks) = body.get("content").and_then(|v| v.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                "text" => {
                    if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                        text.push_str(t);
                    }
                }
                "tool_use" => tool_calls.push(ToolCall {
                    call_id: str_field(block, "id"),
                    tool_name: str_field(block, "name"),
                    arguments: block
                        .get("input")
                        .cloned()
                        .unwrap_or(Value::Object(Default::default())),
                }),
                _ => {}
            }
        }
    }

    ChatResponse {
        content: text,
        tool_calls,
        usage: body.get("usage").and_then(parse_usage),
        model: str_field(body, "model"),
        finish_reason: body
            .get("stop_reason")
            .and_then(|v| v.as_str())
            .map(normalize_stop_reason),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|v| v.as_str()).unwrap_or("").to_owned()
}

fn normalize_stop_reason(s: &str) -> String {
    match s {
        "end_turn" => "stop".to_owned(),
        "tool_use" => "tool_calls".to_owned(),
        other => other.to_owned(),
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens")?.as_u64()? as u32;
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assembly state for tool calls arriving as content-block deltas.
struct StreamState {
    /// block index → (call_id, tool name, argument json buffer)
    open_blocks: std::collections::HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
    done_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            open_blocks: Default::default(),
            usage: None,
            done_emitted: false,
        }
    }
}

fn parse_stream_payload(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    match v.get("type").and_then(|v| v.as_str()).unwrap_or("") {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.usage = msg.get("usage").and_then(parse_usage);
            }
        }
        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                    let call_id = str_field(block, "id");
                    let name = str_field(block, "name");
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                    }));
                    state.open_blocks.insert(idx, (call_id, name, String::new()));
                }
            }
        }
        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(delta) = v.get("delta") {
                match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                            if !text.is_empty() {
                                events.push(Ok(StreamEvent::Token { text: text.into() }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                            if let Some(block) = state.open_blocks.get_mut(&idx) {
                                block.2.push_str(partial);
                                events.push(Ok(StreamEvent::ToolCallDelta {
                                    call_id: block.0.clone(),
                                    delta: partial.into(),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some((call_id, tool_name, args)) = state.open_blocks.remove(&idx) {
                let arguments =
                    serde_json::from_str(&args).unwrap_or(Value::Object(Default::default()));
                events.push(Ok(StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                }));
            }
        }
        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                if let Some(u) = state.usage.as_mut() {
                    u.completion_tokens = output as u32;
                    u.total_tokens = u.prompt_tokens + u.completion_tokens;
                }
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(normalize_stop_reason);
            if stop_reason.is_some() {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    finish_reason: stop_reason,
                }));
            }
        }
        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    finish_reason: Some("stop".into()),
                }));
            }
        }
        "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_owned();
            events.push(Ok(StreamEvent::Error { message }));
        }
        _ => {} // ping and friends
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(model = req.model.as_deref().unwrap_or(&self.default_model), "chat request");
        let resp = self
            .request(false, &req)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Llm {
                provider: "anthropic".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }
        let body: Value = serde_json::from_str(&text)?;
        Ok(parse_response(&body))
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        tracing::debug!(model = req.model.as_deref().unwrap_or(&self.default_model), "stream request");
        let resp = self
            .request(true, &req)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
            return Err(Error::Llm {
                provider: "anthropic".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        let mut state = StreamState::new();
        Ok(sse::event_stream(resp, move |data| {
            parse_stream_payload(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req_with(messages: Vec<Message>, tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            messages,
            tools,
            temperature: Some(0.2),
            max_tokens: None,
            model: None,
        }
    }

    #[test]
    fn system_messages_lift_to_top_level_field() {
        let body = build_body(
            &req_with(
                vec![Message::system("rules"), Message::user("hi")],
                vec![],
            ),
            "model-x",
            false,
        );
        assert_eq!(body["system"], json!("rules"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn tool_results_become_user_messages() {
        let body = build_body(
            &req_with(vec![Message::tool_result("c1", "ok")], vec![]),
            "model-x",
            false,
        );
        let msg = &body["messages"][0];
        assert_eq!(msg["role"], json!("user"));
        assert_eq!(msg["content"][0]["type"], json!("tool_result"));
        assert_eq!(msg["content"][0]["tool_use_id"], json!("c1"));
    }

    #[test]
    fn parse_response_extracts_text_and_tool_use() {
        let body = json!({
            "model": "model-x",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "c9", "name": "GET_USER_CONTEXT", "input": {}}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        });
        let resp = parse_response(&body);
        assert_eq!(resp.content, "checking");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "GET_USER_CONTEXT");
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn stream_assembles_tool_call_from_deltas() {
        let mut state = StreamState::new();
        let mut all = Vec::new();
        for payload in [
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 5, "output_tokens": 0}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "c1", "name": "LPT_APBookkeeper"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"invoice_ids\":"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "[\"i1\"]}"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 9}}),
        ] {
            all.extend(parse_stream_payload(&payload.to_string(), &mut state));
        }

        let events: Vec<_> = all.into_iter().map(|e| e.unwrap()).collect();
        let finished = events.iter().find_map(|e| match e {
            StreamEvent::ToolCallFinished { tool_name, arguments, .. } => {
                Some((tool_name.clone(), arguments.clone()))
            }
            _ => None,
        });
        let (name, args) = finished.expect("tool call assembled");
        assert_eq!(name, "LPT_APBookkeeper");
        assert_eq!(args, json!({"invoice_ids": ["i1"]}));

        match events.last().unwrap() {
            StreamEvent::Done { usage, finish_reason } => {
                assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
                assert_eq!(usage.as_ref().unwrap().total_tokens, 14);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn stream_text_deltas_become_tokens() {
        let mut state = StreamState::new();
        let events = parse_stream_payload(
            &json!({"type": "content_block_delta", "index": 0,
                    "delta": {"type": "text_delta", "text": "hi"}})
                .to_string(),
            &mut state,
        );
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Token { text } if text == "hi"
        ));
    }

    #[test]
    fn message_stop_without_delta_emits_done_once() {
        let mut state = StreamState::new();
        let first = parse_stream_payload(&json!({"type": "message_stop"}).to_string(), &mut state);
        assert_eq!(first.len(), 1);
        let second = parse_stream_payload(&json!({"type": "message_stop"}).to_string(), &mut state);
        assert!(second.is_empty());
    }
}
