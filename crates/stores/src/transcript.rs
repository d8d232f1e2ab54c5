//! Realtime transcript store port.
//!
//! One channel per `{company_id}/job_chats/{thread_key}`. Records are
//! append-only with store-issued monotonic ids, so replay order is the
//! append order. The single exception is the streaming rewrite: an
//! assistant record created with `Streaming` status has its content
//! rewritten until it is marked `Complete`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use fiscus_domain::chat::{ChatMessage, ChatStatus};
use fiscus_domain::error::{Error, Result};

/// Port over the realtime transcript store.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append a record; returns the store-issued ordering id.
    async fn append(&self, channel: &str, message: ChatMessage) -> Result<String>;

    /// Rewrite the content of an existing record (streaming accumulation).
    async fn rewrite(&self, channel: &str, id: &str, content: &str) -> Result<()>;

    /// Set the status of an existing record.
    async fn set_status(&self, channel: &str, id: &str, status: ChatStatus) -> Result<()>;

    /// All records of a channel in append order.
    async fn list(&self, channel: &str) -> Result<Vec<(String, ChatMessage)>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory transcript store for local mode and tests.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    channels: RwLock<HashMap<String, Vec<(String, ChatMessage)>>>,
    next_id: AtomicU64,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(channel: &str, id: &str) -> Error {
    Error::Store(format!("no transcript record {id} in {channel}"))
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(&self, channel: &str, message: ChatMessage) -> Result<String> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("m{seq:08}");
        self.channels
            .write()
            .entry(channel.to_owned())
            .or_default()
            .push((id.clone(), message));
        Ok(id)
    }

    async fn rewrite(&self, channel: &str, id: &str, content: &str) -> Result<()> {
        let mut channels = self.channels.write();
        let records = channels
            .get_mut(channel)
            .ok_or_else(|| not_found(channel, id))?;
        let record = records
            .iter_mut()
            .find(|(rid, _)| rid == id)
            .ok_or_else(|| not_found(channel, id))?;
        record.1.content = content.to_owned();
        Ok(())
    }

    async fn set_status(&self, channel: &str, id: &str, status: ChatStatus) -> Result<()> {
        let mut channels = self.channels.write();
        let records = channels
            .get_mut(channel)
            .ok_or_else(|| not_found(channel, id))?;
        let record = records
            .iter_mut()
            .find(|(rid, _)| rid == id)
            .ok_or_else(|| not_found(channel, id))?;
        record.1.status = status;
        Ok(())
    }

    async fn list(&self, channel: &str) -> Result<Vec<(String, ChatMessage)>> {
        Ok(self
            .channels
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }
}
