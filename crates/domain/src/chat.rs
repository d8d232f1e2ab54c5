use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation messages (provider-agnostic)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message in a conversation, in the internal format every LLM adapter
/// converts to and from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        }
    }
}

impl MessageContent {
    /// Join all text content into one owned string. Non-text parts are
    /// skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Rough character count of everything in this content, including tool
    /// payloads. Used for context-size estimation.
    pub fn char_len(&self) -> usize {
        match self {
            MessageContent::Text(t) => t.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ToolUse { input, .. } => input.to_string().len(),
                    ContentPart::ToolResult { content, .. } => content.len(),
                })
                .sum(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Role tag of a persisted transcript record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    ToolResult,
    SystemSummary,
}

/// Delivery status of a persisted transcript record. Assistant records are
/// created `Streaming` and rewritten until `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Streaming,
    Complete,
    Error,
}

/// One record in the realtime transcript store. The store assigns the
/// ordering id; records are append-only except for the streaming rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub status: ChatStatus,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>, status: ChatStatus) -> Self {
        Self {
            role,
            content: content.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content, ChatStatus::Complete)
    }

    pub fn assistant_complete(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content, ChatStatus::Complete)
    }

    pub fn assistant_streaming() -> Self {
        Self::new(ChatRole::Assistant, "", ChatStatus::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = MessageContent::Text("hello".into());
        assert_eq!(content.extract_all_text(), "hello");
    }

    #[test]
    fn extract_all_text_skips_tool_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "lookup".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "b".into() },
        ]);
        assert_eq!(content.extract_all_text(), "a\nb");
    }

    #[test]
    fn char_len_counts_tool_payloads() {
        let content = MessageContent::Parts(vec![ContentPart::ToolResult {
            tool_use_id: "c1".into(),
            content: "12345".into(),
            is_error: false,
        }]);
        assert_eq!(content.char_len(), 5);
    }

    #[test]
    fn chat_role_serializes_snake_case() {
        let json = serde_json::to_string(&ChatRole::ToolResult).unwrap();
        assert_eq!(json, "\"tool_result\"");
        let json = serde_json::to_string(&ChatRole::SystemSummary).unwrap();
        assert_eq!(json, "\"system_summary\"");
    }

    #[test]
    fn assistant_streaming_starts_empty() {
        let msg = ChatMessage::assistant_streaming();
        assert!(msg.content.is_empty());
        assert_eq!(msg.status, ChatStatus::Streaming);
    }
}
