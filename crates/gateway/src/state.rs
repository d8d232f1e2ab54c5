use std::sync::Arc;

use fiscus_domain::config::Config;
use fiscus_providers::LlmProvider;
use fiscus_stores::{DocumentStore, EphemeralStore, TranscriptStore, VectorSearch};

use crate::auth::TokenVerifier;
use crate::hub::WsHub;
use crate::runtime::lpt::WorkerDispatcher;
use crate::runtime::registry::SessionRegistry;

/// Shared application state passed to all handlers.
///
/// Fields are grouped by concern:
/// - **Core** — config, the session registry, the LLM provider
/// - **Stores** — document, transcript, ephemeral, vector ports
/// - **Edges** — WS hub, worker dispatcher, token verifier
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub llm: Arc<dyn LlmProvider>,

    // ── Stores ────────────────────────────────────────────────────────
    pub docs: Arc<dyn DocumentStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub vector: Arc<dyn VectorSearch>,

    // ── Edges ─────────────────────────────────────────────────────────
    pub hub: Arc<WsHub>,
    pub workers: Arc<dyn WorkerDispatcher>,
    pub verifier: Arc<dyn TokenVerifier>,
}
