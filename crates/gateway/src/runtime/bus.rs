//! Streaming bus — transcript persistence plus connection-mode-gated live
//! broadcast.
//!
//! Persistence is unconditional; only the WS broadcast depends on the
//! connection mode. Assistant records go through the streaming lifecycle
//! (created `Streaming`, content rewritten, then marked `Complete` or
//! `Error`) so subscribers of the transcript store see the same shape
//! whether or not they were attached live.

use serde_json::json;

use fiscus_domain::chat::{ChatMessage, ChatStatus};
use fiscus_domain::error::Result;
use fiscus_stores::paths;

use super::presence::ConnectionMode;
use crate::state::AppState;

/// Persist a user message to the thread transcript.
pub async fn persist_user(
    state: &AppState,
    company_id: &str,
    thread_key: &str,
    content: &str,
) -> Result<String> {
    let channel = paths::chat_channel(company_id, thread_key);
    state
        .transcripts
        .append(&channel, ChatMessage::user(content))
        .await
}

/// Broadcast one streaming chunk to the user's live sockets. No-op in
/// backend mode.
pub fn emit_chunk(state: &AppState, user_id: &str, thread_key: &str, text: &str, mode: ConnectionMode) {
    if !mode.is_ui() {
        return;
    }
    state.hub.broadcast(
        user_id,
        json!({
            "type": "llm_stream_chunk",
            "payload": {"thread_key": thread_key, "content": text},
        }),
    );
}

/// Persist a finished assistant message through the streaming lifecycle
/// and, in UI mode, announce completion on the hub.
pub async fn persist_assistant(
    state: &AppState,
    user_id: &str,
    company_id: &str,
    thread_key: &str,
    content: &str,
    mode: ConnectionMode,
) -> Result<String> {
    finish_assistant(state, user_id, company_id, thread_key, content, mode, ChatStatus::Complete)
        .await
}

/// Persist a fatal-error assistant message (`status = "error"`).
pub async fn persist_assistant_error(
    state: &AppState,
    user_id: &str,
    company_id: &str,
    thread_key: &str,
    content: &str,
    mode: ConnectionMode,
) -> Result<String> {
    finish_assistant(state, user_id, company_id, thread_key, content, mode, ChatStatus::Error).await
}

async fn finish_assistant(
    state: &AppState,
    user_id: &str,
    company_id: &str,
    thread_key: &str,
    content: &str,
    mode: ConnectionMode,
    status: ChatStatus,
) -> Result<String> {
    let channel = paths::chat_channel(company_id, thread_key);
    let id = state
        .transcripts
        .append(&channel, ChatMessage::assistant_streaming())
        .await?;
    state.transcripts.rewrite(&channel, &id, content).await?;
    state.transcripts.set_status(&channel, &id, status).await?;

    if mode.is_ui() {
        state.hub.broadcast(
            user_id,
            json!({
                "type": "llm_stream_complete",
                "payload": {
                    "thread_key": thread_key,
                    "content": content,
                    "status": status,
                    "message_id": id,
                },
            }),
        );
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit;
    use fiscus_domain::chat::ChatRole;

    #[tokio::test]
    async fn assistant_record_passes_through_streaming_to_complete() {
        let state = testkit::state();
        persist_assistant(&state, "u1", "c1", "t1", "done.", ConnectionMode::Backend)
            .await
            .unwrap();

        let records = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.role, ChatRole::Assistant);
        assert_eq!(records[0].1.content, "done.");
        assert_eq!(records[0].1.status, ChatStatus::Complete);
    }

    #[tokio::test]
    async fn ui_mode_broadcasts_completion() {
        let state = testkit::state();
        let (_id, mut rx) = state.hub.subscribe("u1");

        persist_assistant(&state, "u1", "c1", "t1", "hi", ConnectionMode::Ui)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event["type"], "llm_stream_complete");
        assert_eq!(event["payload"]["content"], "hi");
    }

    #[tokio::test]
    async fn backend_mode_persists_without_broadcasting() {
        let state = testkit::state();
        let (_id, mut rx) = state.hub.subscribe("u1");

        persist_assistant(&state, "u1", "c1", "t1", "hi", ConnectionMode::Backend)
            .await
            .unwrap();
        emit_chunk(&state, "u1", "t1", "chunk", ConnectionMode::Backend);

        assert!(rx.try_recv().is_err());
        let records = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn error_message_carries_error_status() {
        let state = testkit::state();
        persist_assistant_error(&state, "u1", "c1", "t1", "boom", ConnectionMode::Backend)
            .await
            .unwrap();
        let records = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(records[0].1.status, ChatStatus::Error);
    }

    #[tokio::test]
    async fn messages_keep_append_order() {
        let state = testkit::state();
        persist_user(&state, "c1", "t1", "question").await.unwrap();
        persist_assistant(&state, "u1", "c1", "t1", "answer", ConnectionMode::Backend)
            .await
            .unwrap();

        let records = state
            .transcripts
            .list(&paths::chat_channel("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(records[0].1.role, ChatRole::User);
        assert_eq!(records[1].1.role, ChatRole::Assistant);
    }
}
