//! Session registry — the singleton in-process map from
//! `"{user_id}:{company_id}"` to live [`Session`]s.
//!
//! A session owns the brains and the context cache for its threads. The
//! per-thread `tokio::sync::Mutex<Brain>` is the serialization point for
//! everything that touches a thread: user turns and callback resumptions
//! queue on the same lock, so at most one agent loop runs per thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use fiscus_domain::context::ThreadContext;
use fiscus_providers::LlmProvider;

use super::brain::Brain;

/// Registry key for one `(user, company)` pair.
pub fn session_key(user_id: &str, company_id: &str) -> String {
    format!("{user_id}:{company_id}")
}

struct CachedContext {
    context: ThreadContext,
    cached_at: Instant,
}

/// Live state for one `(user, company)` pair.
pub struct Session {
    pub user_id: String,
    pub company_id: String,
    /// The LLM handle shared by every brain of this session.
    pub llm: Arc<dyn LlmProvider>,
    pub system_prompt: String,
    brains: RwLock<HashMap<String, Arc<Mutex<Brain>>>>,
    context_cache: RwLock<HashMap<String, CachedContext>>,
}

impl Session {
    fn new(
        user_id: &str,
        company_id: &str,
        llm: Arc<dyn LlmProvider>,
        system_prompt: String,
    ) -> Self {
        Self {
            user_id: user_id.to_owned(),
            company_id: company_id.to_owned(),
            llm,
            system_prompt,
            brains: RwLock::new(HashMap::new()),
            context_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_key(&self) -> String {
        session_key(&self.user_id, &self.company_id)
    }

    /// The brain for a thread, created on first use.
    pub fn brain(&self, thread_key: &str) -> Arc<Mutex<Brain>> {
        {
            let brains = self.brains.read();
            if let Some(brain) = brains.get(thread_key) {
                return brain.clone();
            }
        }
        let mut brains = self.brains.write();
        brains
            .entry(thread_key.to_owned())
            .or_insert_with(|| {
                tracing::debug!(
                    session_key = %self.session_key(),
                    thread_key,
                    "brain created"
                );
                Arc::new(Mutex::new(Brain::new(thread_key)))
            })
            .clone()
    }

    pub fn thread_count(&self) -> usize {
        self.brains.read().len()
    }

    /// Cached context for a thread, if still fresh (strictly younger than
    /// the TTL). An entry at exactly the TTL counts as stale.
    pub fn fresh_context(&self, thread_key: &str, ttl: Duration) -> Option<ThreadContext> {
        let cache = self.context_cache.read();
        cache
            .get(thread_key)
            .filter(|c| c.cached_at.elapsed() < ttl)
            .map(|c| c.context.clone())
    }

    pub fn store_context(&self, thread_key: &str, context: ThreadContext) {
        self.context_cache.write().insert(
            thread_key.to_owned(),
            CachedContext {
                context,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate_context(&self, thread_key: &str) {
        self.context_cache.write().remove(thread_key);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide session map. Registry operations never fail.
pub struct SessionRegistry {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(llm: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Atomic upsert: at most one session per `(user, company)` exists at
    /// any time, no matter how many callers race here.
    pub fn get_or_create(&self, user_id: &str, company_id: &str) -> Arc<Session> {
        let key = session_key(user_id, company_id);
        {
            let sessions = self.sessions.read();
            if let Some(session) = sessions.get(&key) {
                return session.clone();
            }
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::info!(session_key = %key, "session created");
                Arc::new(Session::new(
                    user_id,
                    company_id,
                    self.llm.clone(),
                    self.system_prompt.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, user_id: &str, company_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .get(&session_key(user_id, company_id))
            .cloned()
    }

    /// Remove a session. Outstanding long-process tasks survive through
    /// their task records; their callbacks recreate the session.
    pub fn evict(&self, user_id: &str, company_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .remove(&session_key(user_id, company_id))
            .is_some();
        if removed {
            tracing::info!(
                session_key = %session_key(user_id, company_id),
                "session evicted"
            );
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}
