//! Short-process tool handlers — synchronous lookups that complete within
//! the turn. Handlers never suspend the loop; failures come back as
//! `{"success": false, "error": …}` results the model can react to.

use serde_json::{json, Value};

use fiscus_domain::context::ThreadContext;
use fiscus_domain::error::Error;
use fiscus_domain::tool::FilterSpec;

use crate::state::AppState;

/// `GET_STRUCTURED_DATA` — filtered read from the document store.
pub async fn get_structured_data(state: &AppState, path: &str, filters: &[FilterSpec]) -> Value {
    // A path with an odd segment count names a collection; even names a
    // single document.
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    if segments % 2 == 0 {
        return match state.docs.get(path).await {
            Ok(Some(doc)) => json!({"success": true, "count": 1, "documents": [doc]}),
            Ok(None) => json!({"success": true, "count": 0, "documents": []}),
            Err(e) => failure(e),
        };
    }

    match state.docs.query(path, filters).await {
        Ok(rows) => {
            let documents: Vec<Value> = rows
                .into_iter()
                .map(|(id, mut doc)| {
                    if let Some(obj) = doc.as_object_mut() {
                        obj.insert("id".into(), Value::String(id));
                    }
                    doc
                })
                .collect();
            json!({"success": true, "count": documents.len(), "documents": documents})
        }
        Err(e) => failure(e),
    }
}

/// `SEARCH_VECTOR_STORE` — semantic lookup.
pub async fn search_vector_store(state: &AppState, query: &str, n_results: usize) -> Value {
    match state.vector.search(query, n_results).await {
        Ok(hits) => json!({
            "success": true,
            "count": hits.len(),
            "results": hits,
        }),
        Err(e) => failure(e),
    }
}

/// `GET_USER_CONTEXT` — the loaded thread context, as the model may see it.
pub fn user_context(context: &ThreadContext) -> Value {
    json!({
        "success": true,
        "context": {
            "company_id": context.company_id,
            "company_name": context.company_name,
            "mandate_path": context.mandate_path,
            "dms_system": context.dms_system,
            "communication_mode": context.communication_mode,
            "bank_erp": context.bank_erp,
            "drive_space_parent_id": context.drive_space_parent_id,
        }
    })
}

/// Handler failures are tool results, never loop aborts.
fn failure(e: impl std::fmt::Display) -> Value {
    let err = Error::ToolHandler(e.to_string());
    json!({"success": false, "error": err.to_string()})
}
