//! Context loader — assembles the per-thread business context from the
//! document store and caches it on the session with a TTL.

use std::time::Duration;

use serde_json::Value;

use fiscus_domain::context::{
    ThreadContext, DEFAULT_COMMUNICATION_MODE, DEFAULT_DMS_SYSTEM, DEFAULT_LOG_COMMUNICATION_MODE,
};
use fiscus_domain::error::Result;
use fiscus_domain::tool::{FilterOp, FilterSpec};
use fiscus_stores::paths;

use crate::runtime::registry::Session;
use crate::state::AppState;

/// Load the context for a thread, honoring the session cache.
///
/// Best-effort by design: a missing client record falls back to a
/// deterministic client uuid and a context that short-process lookups can
/// still use. Whether the result supports long-process dispatch is
/// checked at dispatch time via [`ThreadContext::is_dispatch_ready`].
pub async fn load(state: &AppState, session: &Session, thread_key: &str) -> Result<ThreadContext> {
    let ttl = Duration::from_secs(state.config.context.cache_ttl_secs);
    if let Some(context) = session.fresh_context(thread_key, ttl) {
        return Ok(context);
    }

    let context = fetch(state, &session.user_id, &session.company_id).await?;
    session.store_context(thread_key, context.clone());
    Ok(context)
}

/// Rebuild the context from the store, bypassing the cache.
async fn fetch(state: &AppState, user_id: &str, company_id: &str) -> Result<ThreadContext> {
    // 1. Client root → client uuid (deterministic fallback when absent).
    let client_doc = state.docs.get(&paths::client_root(user_id)).await?;
    let client_uuid = client_doc
        .as_ref()
        .and_then(|d| d.get("client_uuid"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| {
            tracing::warn!(user_id, "client record missing, using fallback uuid");
            ThreadContext::fallback_client_uuid(user_id)
        });

    // 2. Mandate matching this company.
    let mandates = state
        .docs
        .query(
            &paths::mandates(&client_uuid),
            &[FilterSpec {
                field: "contact_space_id".into(),
                op: FilterOp::Eq,
                value: Value::String(company_id.to_owned()),
            }],
        )
        .await?;

    let mut context = ThreadContext {
        client_uuid: client_uuid.clone(),
        company_id: company_id.to_owned(),
        dms_system: DEFAULT_DMS_SYSTEM.into(),
        communication_mode: DEFAULT_COMMUNICATION_MODE.into(),
        log_communication_mode: DEFAULT_LOG_COMMUNICATION_MODE.into(),
        ..Default::default()
    };

    let (mandate_id, mandate_doc) = match mandates.into_iter().next() {
        Some(row) => row,
        None => {
            tracing::warn!(user_id, company_id, "no mandate for company");
            return Ok(context);
        }
    };
    context.mandate_path = paths::mandate(&client_uuid, &mandate_id);
    apply_mandate_fields(&mut context, &mandate_doc);

    // 3. ERP record under the mandate.
    let erp_rows = state
        .docs
        .query(&paths::erp_collection(&context.mandate_path), &[])
        .await?;
    if let Some((erp_id, erp_doc)) = erp_rows.into_iter().next() {
        context.bank_erp = erp_doc
            .get("bank_erp")
            .and_then(|v| v.as_str())
            .unwrap_or(&erp_id)
            .to_owned();
    }

    Ok(context)
}

fn apply_mandate_fields(context: &mut ThreadContext, doc: &Value) {
    let take = |key: &str| -> Option<String> {
        doc.get(key).and_then(|v| v.as_str()).map(String::from)
    };
    if let Some(v) = take("company_name") {
        context.company_name = v;
    }
    if let Some(v) = take("dms_system") {
        context.dms_system = v;
    }
    if let Some(v) = take("communication_mode") {
        context.communication_mode = v;
    }
    if let Some(v) = take("log_communication_mode") {
        context.log_communication_mode = v;
    }
    if let Some(v) = take("drive_space_parent_id") {
        context.drive_space_parent_id = v;
    }
}
