//! Shared fixtures for the runtime unit tests: an in-memory app state, a
//! recording worker transport, and seed helpers.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use fiscus_domain::config::Config;
use fiscus_domain::context::ThreadContext;
use fiscus_domain::error::{Error, Result};
use fiscus_providers::scripted::{ScriptedProvider, ScriptedTurn};
use fiscus_stores::{
    paths, MemoryDocumentStore, MemoryEphemeralStore, MemoryTranscriptStore, MemoryVectorIndex,
};

use crate::auth::SharedSecretVerifier;
use crate::hub::WsHub;
use crate::runtime::lpt::WorkerDispatcher;
use crate::runtime::registry::SessionRegistry;
use crate::state::AppState;

/// Worker transport double: records payloads, optionally fails the next
/// dispatch.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(String, Value)>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

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

/// An [`AppState`] over in-memory ports, with the concrete doubles kept
/// reachable for assertions.
pub struct TestState {
    app: AppState,
    pub seeded_workers: Arc<RecordingDispatcher>,
    pub seeded_vector: Arc<MemoryVectorIndex>,
    pub seeded_llm: Arc<ScriptedProvider>,
}

impl TestState {
    /// An owned [`AppState`] clone, for handlers that take it by value.
    pub fn app(&self) -> AppState {
        self.app.clone()
    }
}

impl Deref for TestState {
    type Target = AppState;
    fn deref(&self) -> &AppState {
        &self.app
    }
}

impl DerefMut for TestState {
    fn deref_mut(&mut self) -> &mut AppState {
        &mut self.app
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.workers.endpoints = HashMap::from([
        ("ap_bookkeeper".into(), "http://workers.local/ap_bookkeeper".into()),
        ("router".into(), "http://workers.local/router".into()),
        ("bank_reconciler".into(), "http://workers.local/bank_reconciler".into()),
    ]);
    config
}

pub fn state() -> TestState {
    state_with_script([])
}

pub fn state_with_script(turns: impl IntoIterator<Item = ScriptedTurn>) -> TestState {
    let llm = Arc::new(ScriptedProvider::new(turns));
    let workers = Arc::new(RecordingDispatcher::default());
    let vector = Arc::new(MemoryVectorIndex::new());
    let config = Arc::new(test_config());
    let registry = Arc::new(SessionRegistry::new(
        llm.clone(),
        config.llm.system_prompt.clone(),
    ));

    let app = AppState {
        config,
        registry,
        llm: llm.clone(),
        docs: Arc::new(MemoryDocumentStore::new()),
        transcripts: Arc::new(MemoryTranscriptStore::new()),
        ephemeral: Arc::new(MemoryEphemeralStore::new()),
        vector: vector.clone(),
        hub: Arc::new(WsHub::new()),
        workers: workers.clone(),
        verifier: Arc::new(SharedSecretVerifier::new(None)),
    };

    TestState {
        app,
        seeded_workers: workers,
        seeded_vector: vector,
        seeded_llm: llm,
    }
}

/// A dispatch-ready context without touching the store.
pub fn ready_context(company_id: &str) -> ThreadContext {
    ThreadContext {
        client_uuid: "cu-test".into(),
        company_id: company_id.to_owned(),
        company_name: "Test Co".into(),
        mandate_path: "bo_clients/cu-test/mandates/m1".into(),
        dms_system: "google_drive".into(),
        communication_mode: "webhook".into(),
        log_communication_mode: "firebase".into(),
        drive_space_parent_id: "drv-test".into(),
        bank_erp: "qonto".into(),
    }
}

/// Seed a full client → mandate → ERP profile so the context loader
/// produces a dispatch-ready context.
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
