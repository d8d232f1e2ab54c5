//! Shared harness for the end-to-end tests: in-memory ports, the
//! scripted LLM, and a recording worker transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use fiscus_domain::config::Config;
use fiscus_domain::error::{Error, Result};
use fiscus_gateway::auth::SharedSecretVerifier;
use fiscus_gateway::hub::WsHub;
use fiscus_gateway::runtime::lpt::WorkerDispatcher;
use fiscus_gateway::runtime::registry::SessionRegistry;
use fiscus_gateway::state::AppState;
use fiscus_providers::scripted::{ScriptedProvider, ScriptedTurn};
use fiscus_stores::{
    paths, MemoryDocumentStore, MemoryEphemeralStore, MemoryTranscriptStore, MemoryVectorIndex,
};

/// Records every dispatched payload; can fail the next dispatch.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(String, Value)>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    #[allow(dead_code)]
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }
}

#[async_trait]
impl WorkerDispatcher for RecordingDispatcher {
    async fn dispatch(&self, endpoint: &str, payload: &Value, _timeout: Duration) -> Result<()> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(Error::Dispatch(message));
        }
        self.sent.lock().push((endpoint.to_owned(), payload.clone()));
        Ok(())
    }
}

/// The full fixture: an [`AppState`] plus the concrete doubles.
pub struct Harness {
    pub state: AppState,
    pub llm: Arc<ScriptedProvider>,
    pub workers: Arc<RecordingDispatcher>,
}

pub fn harness(turns: impl IntoIterator<Item = ScriptedTurn>) -> Harness {
    let llm = Arc::new(ScriptedProvider::new(turns));
    let workers = Arc::new(RecordingDispatcher::default());

    let mut config = Config::default();
    config.workers.endpoints = HashMap::from([
        ("ap_bookkeeper".to_string(), "http://workers.local/ap_bookkeeper".to_string()),
        ("router".to_string(), "http://workers.local/router".to_string()),
        ("bank_reconciler".to_string(), "http://workers.local/bank_reconciler".to_string()),
    ]);
    let config = Arc::new(config);

    let registry = Arc::new(SessionRegistry::new(
        llm.clone(),
        config.llm.system_prompt.clone(),
    ));

    let state = AppState {
        config,
        registry,
        llm: llm.clone(),
        docs: Arc::new(MemoryDocumentStore::new()),
        transcripts: Arc::new(MemoryTranscriptStore::new()),
        ephemeral: Arc::new(MemoryEphemeralStore::new()),
        vector: Arc::new(MemoryVectorIndex::new()),
        hub: Arc::new(WsHub::new()),
        workers: workers.clone(),
        verifier: Arc::new(SharedSecretVerifier::new(None)),
    };

    Harness {
        state,
        llm,
        workers,
    }
}

/// Seed the client → mandate → ERP profile the context loader joins.
pub async fn seed_profile(state: &AppState, user_id: &str, company_id: &str) {
    state
        .docs
        .set(
            &paths::client_root(user_id),
            json!({"client_uuid": format!("cu-{user_id}")}),
        )
        .await
        .unwrap();
    let mandate_path = paths::mandate(&format!("cu-{user_id}"), "m1");
    state
        .docs
        .set(
            &mandate_path,
            json!({
                "contact_space_id": company_id,
                "company_name": "Test Co",
                "drive_space_parent_id": "drv-test",
            }),
        )
        .await
        .unwrap();
    state
        .docs
        .set(&format!("{mandate_path}/erp/e1"), json!({"bank_erp": "qonto"}))
        .await
        .unwrap();
}

/// All transcript messages of a thread, in order.
pub async fn transcript(
    state: &AppState,
    company_id: &str,
    thread_key: &str,
) -> Vec<fiscus_domain::chat::ChatMessage> {
    state
        .transcripts
        .list(&paths::chat_channel(company_id, thread_key))
        .await
        .unwrap()
        .into_iter()
        .map(|(_, m)| m)
        .collect()
}
