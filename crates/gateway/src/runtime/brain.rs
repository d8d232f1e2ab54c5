//! Brain — the live state of one conversation thread: its history, its
//! outstanding long-process tasks, and where it sits in the per-message
//! lifecycle.

use std::collections::HashSet;

use fiscus_domain::chat::Message;
use fiscus_providers::tokens::estimate_conversation_tokens;

/// Lifecycle of a brain across one user message.
///
/// `Suspended` means at least one long-process task is outstanding; the
/// history is retained so the callback resumption can continue the
/// conversation. Only the callback resumer moves a brain back to
/// `Running` from `Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainState {
    Idle,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// Live state for one `(user, company, thread)` conversation.
pub struct Brain {
    pub thread_key: String,
    pub state: BrainState,
    /// Role-tagged conversation history for this thread.
    history: Vec<Message>,
    /// Task ids of outstanding long-process dispatches.
    active_lpt_tasks: HashSet<String>,
    /// The query the current mission started from, kept for the
    /// summarize-and-reseed path.
    pub original_query: String,
}

impl Brain {
    pub fn new(thread_key: impl Into<String>) -> Self {
        Self {
            thread_key: thread_key.into(),
            state: BrainState::Idle,
            history: Vec::new(),
            active_lpt_tasks: HashSet::new(),
            original_query: String::new(),
        }
    }

    // ── History ───────────────────────────────────────────────────────

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Flush the conversation. The active-task set is kept; callbacks for
    /// tasks dispatched earlier still reopen this brain.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Replace the history with a single seed message (self-healing).
    pub fn reseed(&mut self, seed: Message) {
        self.history.clear();
        self.history.push(seed);
    }

    /// Estimated context size of the current history, in tokens.
    pub fn estimated_tokens(&self) -> u32 {
        estimate_conversation_tokens(&self.history)
    }

    // ── Long-process task tracking ────────────────────────────────────

    pub fn add_task(&mut self, task_id: impl Into<String>) {
        self.active_lpt_tasks.insert(task_id.into());
    }

    pub fn remove_task(&mut self, task_id: &str) -> bool {
        self.active_lpt_tasks.remove(task_id)
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.active_lpt_tasks.contains(task_id)
    }

    pub fn active_task_count(&self) -> usize {
        self.active_lpt_tasks.len()
    }
}
