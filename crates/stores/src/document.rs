//! Structured document store port.
//!
//! Documents live at slash-separated paths; a collection is a path whose
//! direct children are documents. The store is assumed serializable
//! per-key by the backing service.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use fiscus_domain::error::Result;
use fiscus_domain::tool::{FilterOp, FilterSpec};

/// Port over the structured document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document. `None` when the path holds nothing.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Write (replace) one document.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Shallow-merge object fields into an existing document (creates it
    /// when absent).
    async fn merge(&self, path: &str, value: Value) -> Result<()>;

    /// Delete one document. Returns whether it existed.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// List the direct children of a collection that match every filter,
    /// ordered by document id. Returns `(id, document)` pairs.
    async fn query(&self, collection: &str, filters: &[FilterSpec]) -> Result<Vec<(String, Value)>>;
}

/// Evaluate one filter against a document.
fn filter_matches(doc: &Value, filter: &FilterSpec) -> bool {
    let field = match doc.get(&filter.field) {
        Some(v) => v,
        None => return false,
    };
    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::Ne => field != &filter.value,
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let (a, b) = match (field.as_f64(), filter.value.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return false,
            };
            match filter.op {
                FilterOp::Gt => a > b,
                FilterOp::Gte => a >= b,
                FilterOp::Lt => a < b,
                FilterOp::Lte => a <= b,
                _ => unreachable!(),
            }
        }
        FilterOp::Contains => match (field, &filter.value) {
            (Value::String(hay), Value::String(needle)) => hay.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory document store for local mode and tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (for assertions in tests).
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.docs.read().get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.docs.write().insert(path.to_owned(), value);
        Ok(())
    }

    async fn merge(&self, path: &str, value: Value) -> Result<()> {
        let mut docs = self.docs.write();
        let entry = docs
            .entry(path.to_owned())
            .or_insert_with(|| Value::Object(Default::default()));
        if let (Value::Object(existing), Value::Object(incoming)) = (entry, value) {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.docs.write().remove(path).is_some())
    }

    async fn query(&self, collection: &str, filters: &[FilterSpec]) -> Result<Vec<(String, Value)>> {
        let prefix = format!("{}/", collection.trim_end_matches('/'));
        let docs = self.docs.read();
        let mut out = Vec::new();
        for (path, doc) in docs.range(prefix.clone()..) {
            if !path.starts_with(&prefix) {
                break;
            }
            let id = &path[prefix.len()..];
            if id.contains('/') {
                continue; // grandchild of a nested collection
            }
            if filters.iter().all(|f| filter_matches(doc, f)) {
                out.push((id.to_owned(), doc.clone()));
            }
        }
        Ok(out)
    }
}
