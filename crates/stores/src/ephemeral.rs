//! Ephemeral (Redis-like) store port — TTL'd JSON values keyed by
//! colon-namespaced strings. Holds auth sessions and presence heartbeats.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;

use fiscus_domain::error::Result;

/// Port over the ephemeral store.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Write a value. `ttl = None` means no expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Shallow-merge object fields into an existing value, preserving its
    /// TTL. Creates the key (without expiry) when absent.
    async fn merge(&self, key: &str, value: Value) -> Result<()>;

    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn delete(&self, key: &str) -> Result<bool>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory ephemeral store. Expiry is evaluated lazily on read.
#[derive(Default)]
pub struct MemoryEphemeralStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for MemoryEphemeralStore {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries
            .write()
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn merge(&self, key: &str, value: Value) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let entry = entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Object(Default::default()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = Value::Object(Default::default());
            entry.expires_at = None;
        }
        if let (Value::Object(existing), Value::Object(incoming)) = (&mut entry.value, value) {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}
