//! Vector store port — semantic lookup consumed by the short-process
//! search tool.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use fiscus_domain::error::Result;

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub content: String,
    pub score: f32,
}

/// Port over the semantic search service.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Naive in-memory index: term-overlap scoring, good enough for local
/// mode and tests.
#[derive(Default)]
pub struct MemoryVectorIndex {
    docs: RwLock<Vec<(String, String)>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: impl Into<String>, content: impl Into<String>) {
        self.docs.write().push((document_id.into(), content.into()));
    }
}

fn overlap_score(query: &str, content: &str) -> f32 {
    let content_lower = content.to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms
        .iter()
        .filter(|t| content_lower.contains(&t.to_lowercase()))
        .count();
    hits as f32 / terms.len() as f32
}

#[async_trait]
impl VectorSearch for MemoryVectorIndex {
    async fn search(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>> {
        let docs = self.docs.read();
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .map(|(id, content)| SearchHit {
                document_id: id.clone(),
                content: content.clone(),
                score: overlap_score(query, content),
            })
            .filter(|h| h.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }
}
