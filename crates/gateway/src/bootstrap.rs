//! AppState construction — wires the store ports, the LLM provider, the
//! session registry, and the worker transport from config.
//!
//! Local mode runs entirely on the in-memory store implementations;
//! production deployments swap the adapters behind the same traits.

use std::sync::Arc;

use anyhow::Context;

use fiscus_domain::config::Config;
use fiscus_providers::{AnthropicProvider, LlmProvider, ScriptedProvider};
use fiscus_stores::{
    MemoryDocumentStore, MemoryEphemeralStore, MemoryTranscriptStore, MemoryVectorIndex,
};

use crate::auth::SharedSecretVerifier;
use crate::hub::WsHub;
use crate::runtime::lpt::HttpWorkerDispatcher;
use crate::runtime::registry::SessionRegistry;
use crate::state::AppState;

/// Build the application state.
///
/// `offline` swaps the Anthropic provider for the scripted one, so the
/// gateway can boot without credentials (demos, smoke tests).
pub fn build_state(config: Arc<Config>, offline: bool) -> anyhow::Result<AppState> {
    let llm: Arc<dyn LlmProvider> = if offline {
        tracing::warn!("offline mode: using the scripted LLM provider");
        Arc::new(ScriptedProvider::new([]))
    } else {
        Arc::new(AnthropicProvider::from_config(&config.llm).context("initializing LLM provider")?)
    };

    let registry = Arc::new(SessionRegistry::new(
        llm.clone(),
        config.llm.system_prompt.clone(),
    ));

    let workers = Arc::new(HttpWorkerDispatcher::new().context("initializing worker transport")?);
    let verifier = Arc::new(SharedSecretVerifier::new(config.auth.shared_secret.clone()));

    Ok(AppState {
        config,
        registry,
        llm,
        docs: Arc::new(MemoryDocumentStore::new()),
        transcripts: Arc::new(MemoryTranscriptStore::new()),
        ephemeral: Arc::new(MemoryEphemeralStore::new()),
        vector: Arc::new(MemoryVectorIndex::new()),
        hub: Arc::new(WsHub::new()),
        workers,
        verifier,
    })
}
