//! WebSocket ingress for the frontend.
//!
//! Flow:
//! 1. Client connects to `/ws` and sends `auth.firebase_token`
//! 2. On success the socket is bound to the uid and subscribed to the
//!    hub, so runtime broadcasts (stream chunks, completions) reach it
//! 3. Subsequent frames carry chat messages, heartbeats, and dashboard
//!    orchestration requests
//!
//! Every frame is `{"type": ..., "payload": ...}` in both directions.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::auth;
use crate::hub::SubscriptionId;
use crate::runtime::{agent_loop, bus, context, presence, LoopRequest};
use crate::state::AppState;

/// GET /ws — upgrade to WebSocket.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Authenticated identity of one socket.
pub struct SocketAuth {
    pub uid: String,
    subscription: SubscriptionId,
    forwarder: tokio::task::JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // All outbound traffic (direct replies + hub broadcasts) funnels
    // through one channel into the sink.
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(256);
    let writer = tokio::spawn(async move {
        while let Some(value) = out_rx.recv().await {
            if sink.send(Message::Text(value.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut authed: Option<SocketAuth> = None;

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(frame) => handle_frame(&state, &out_tx, &mut authed, frame).await,
                Err(_) => {
                    send(&out_tx, error_frame("unparseable frame")).await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup: detach from the hub and stop the writer.
    if let Some(auth) = authed {
        state.hub.unsubscribe(&auth.uid, auth.subscription);
        auth.forwarder.abort();
        tracing::info!(uid = %auth.uid, "socket disconnected");
    }
    writer.abort();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_frame(
    state: &AppState,
    out: &mpsc::Sender<Value>,
    authed: &mut Option<SocketAuth>,
    frame: Value,
) {
    let frame_type = frame.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let payload = frame.get("payload").cloned().unwrap_or(Value::Null);

    match frame_type {
        "auth.firebase_token" => handle_auth(state, out, authed, &payload).await,
        "presence.heartbeat" => {
            if let Some(auth) = authed {
                presence::record_heartbeat(state.ephemeral.as_ref(), &auth.uid).await;
            }
        }
        "chat.user_message" => {
            let Some(auth) = authed else {
                send(out, error_frame("not authenticated")).await;
                return;
            };
            let uid = auth.uid.clone();
            match ChatFrame::parse(&payload, &uid) {
                Ok(chat) => {
                    presence::record_heartbeat(state.ephemeral.as_ref(), &uid).await;
                    let state = state.clone();
                    tokio::spawn(async move { handle_chat(&state, chat).await });
                }
                Err(message) => send(out, error_frame(&message)).await,
            }
        }
        "dashboard.orchestrate_init" | "dashboard.company_change" | "dashboard.refresh" => {
            let Some(auth) = authed else {
                send(out, error_frame("not authenticated")).await;
                return;
            };
            handle_dashboard(state, out, &auth.uid, frame_type, &payload).await;
        }
        other => {
            send(out, error_frame(&format!("unknown frame type '{other}'"))).await;
        }
    }
}

async fn handle_auth(
    state: &AppState,
    out: &mpsc::Sender<Value>,
    authed: &mut Option<SocketAuth>,
    payload: &Value,
) {
    let token = payload.get("token").and_then(|v| v.as_str()).unwrap_or("");
    let uid = payload.get("uid").and_then(|v| v.as_str()).unwrap_or("");
    let session_id = payload
        .get("sessionId")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let email = payload.get("email").and_then(|v| v.as_str());

    let established = auth::establish_session(
        state.verifier.as_ref(),
        &state.ephemeral,
        token,
        uid,
        session_id,
        email,
        state.config.auth.session_ttl_secs,
    )
    .await;

    match established {
        Ok(claims) => {
            presence::record_heartbeat(state.ephemeral.as_ref(), &claims.uid).await;

            // Bind the socket to the uid: hub events flow to this sink.
            let (subscription, mut hub_rx) = state.hub.subscribe(&claims.uid);
            let hub_out = out.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = hub_rx.recv().await {
                    if hub_out.send(event).await.is_err() {
                        break;
                    }
                }
            });
            *authed = Some(SocketAuth {
                uid: claims.uid.clone(),
                subscription,
                forwarder,
            });

            send(
                out,
                json!({
                    "type": "auth.session_confirmed",
                    "payload": {"uid": claims.uid, "session_id": session_id},
                }),
            )
            .await;
        }
        Err(e) => {
            tracing::warn!(uid, error = %e, "login failed");
            send(
                out,
                json!({
                    "type": "auth.login_error",
                    "payload": {"error": e.to_string()},
                }),
            )
            .await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parsed `chat.user_message` payload.
#[derive(Debug)]
pub struct ChatFrame {
    pub user_id: String,
    pub company_id: String,
    pub thread_key: String,
    pub content: String,
}

impl ChatFrame {
    fn parse(payload: &Value, authed_uid: &str) -> Result<Self, String> {
        let field = |key: &str| -> Result<String, String> {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or_else(|| format!("missing field {key}"))
        };
        let user_id = field("user_id")?;
        if user_id != authed_uid {
            return Err("user_id does not match the authenticated uid".into());
        }
        Ok(Self {
            user_id,
            company_id: field("company_id")?,
            thread_key: field("thread_key")?,
            content: field("content")?,
        })
    }
}

/// Persist the user message and drive the agent loop. Replies reach the
/// client through the hub (stream chunks in UI mode, completion event
/// when the reply is persisted).
pub async fn handle_chat(state: &AppState, chat: ChatFrame) {
    if let Err(e) = bus::persist_user(state, &chat.company_id, &chat.thread_key, &chat.content).await
    {
        tracing::error!(thread_key = %chat.thread_key, error = %e, "failed to persist user message");
        return;
    }

    let mode = presence::classify(
        state.ephemeral.as_ref(),
        &chat.user_id,
        state.config.presence.heartbeat_fresh_secs,
        Utc::now(),
    )
    .await;

    agent_loop::run(
        state,
        LoopRequest {
            user_id: chat.user_id,
            company_id: chat.company_id,
            thread_key: chat.thread_key,
            initial_query: chat.content,
            mode,
            resume_task: None,
        },
    )
    .await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dashboard orchestration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dashboard requests pre-warm the thread context and stream phase
/// events back so the frontend can show load progress.
async fn handle_dashboard(
    state: &AppState,
    out: &mpsc::Sender<Value>,
    uid: &str,
    frame_type: &str,
    payload: &Value,
) {
    let company_id = payload
        .get("company_id")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let thread_key = payload
        .get("thread_key")
        .and_then(|v| v.as_str())
        .unwrap_or("dashboard");
    if company_id.is_empty() {
        send(out, error_frame("missing field company_id")).await;
        return;
    }

    send(
        out,
        json!({"type": "phase_start", "payload": {"phase": "context", "trigger": frame_type}}),
    )
    .await;

    let session = state.registry.get_or_create(uid, company_id);
    if frame_type == "dashboard.company_change" || frame_type == "dashboard.refresh" {
        session.invalidate_context(thread_key);
    }

    send(
        out,
        json!({"type": "data_loading_progress", "payload": {"phase": "context", "progress": 50}}),
    )
    .await;

    match context::load(state, &session, thread_key).await {
        Ok(ctx) => {
            send(
                out,
                json!({
                    "type": "phase_complete",
                    "payload": {
                        "phase": "context",
                        "company_name": ctx.company_name,
                        "bank_erp": ctx.bank_erp,
                        "dms_system": ctx.dms_system,
                        "dispatch_ready": ctx.is_dispatch_ready(),
                    },
                }),
            )
            .await;
        }
        Err(e) => {
            send(
                out,
                json!({
                    "type": "phase_complete",
                    "payload": {"phase": "context", "error": e.to_string()},
                }),
            )
            .await;
        }
    }
}

// ── plumbing ───────────────────────────────────────────────────────

async fn send(out: &mpsc::Sender<Value>, frame: Value) {
    if out.send(frame).await.is_err() {
        tracing::debug!("socket writer gone, dropping frame");
    }
}

fn error_frame(message: &str) -> Value {
    json!({"type": "error", "payload": {"error": message}})
}
