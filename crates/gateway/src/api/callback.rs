//! `POST /lpt/callback` — the worker fleet reports task outcomes here.
//!
//! Always answers 200: `{ok:true}` for handled callbacks (including
//! idempotent no-ops), `{ok:false, error}` for malformed input.
//! Idempotency wins over strictness.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::runtime::resume::{self, CallbackPayload};
use crate::state::AppState;

pub async fn lpt_callback(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let payload: CallbackPayload = match serde_json::from_value(body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "malformed callback body");
            return Json(json!({"ok": false, "error": format!("malformed callback: {e}")}));
        }
    };

    tracing::info!(
        task_id = %payload.task_id,
        thread_key = %payload.thread_key,
        status = %payload.status,
        "worker callback received"
    );

    match resume::handle_callback(&state, payload).await {
        Ok(disposition) => {
            tracing::debug!(?disposition, "callback handled");
            Json(json!({"ok": true}))
        }
        Err(e) => {
            tracing::error!(error = %e, "callback handling failed");
            Json(json!({"ok": false, "error": e.to_string()}))
        }
    }
}
