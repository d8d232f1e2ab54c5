//! Path builders for the document and transcript stores.
//!
//! All store keys flow through these helpers so the collection layout is
//! defined in exactly one place.

/// `clients/{user_id}/bo_clients/{user_id}` — the client root document.
pub fn client_root(user_id: &str) -> String {
    format!("clients/{user_id}/bo_clients/{user_id}")
}

/// `bo_clients/{client_uuid}/mandates` — mandate collection for a client.
pub fn mandates(client_uuid: &str) -> String {
    format!("bo_clients/{client_uuid}/mandates")
}

/// `bo_clients/{client_uuid}/mandates/{mandate_id}` — one mandate.
pub fn mandate(client_uuid: &str, mandate_id: &str) -> String {
    format!("bo_clients/{client_uuid}/mandates/{mandate_id}")
}

/// `{mandate_path}/erp` — ERP collection under a mandate.
pub fn erp_collection(mandate_path: &str) -> String {
    format!("{mandate_path}/erp")
}

/// `clients/{user_id}/workflow_pinnokio/{thread_key}/tasks` — task records
/// for one thread.
pub fn tasks(user_id: &str, thread_key: &str) -> String {
    format!("clients/{user_id}/workflow_pinnokio/{thread_key}/tasks")
}

/// `clients/{user_id}/workflow_pinnokio/{thread_key}/tasks/{task_id}`.
pub fn task(user_id: &str, thread_key: &str, task_id: &str) -> String {
    format!("{}/{task_id}", tasks(user_id, thread_key))
}

/// `clients/{user_id}/notifications/{task_id}` — UI notification record.
pub fn notification(user_id: &str, task_id: &str) -> String {
    format!("clients/{user_id}/notifications/{task_id}")
}

/// `jobs/{job_id}` — recurring scheduler job record.
pub fn job(job_id: &str) -> String {
    format!("jobs/{job_id}")
}

/// `{company_id}/job_chats/{thread_key}` — transcript channel for a thread.
pub fn chat_channel(company_id: &str, thread_key: &str) -> String {
    format!("{company_id}/job_chats/{thread_key}")
}

/// `registry:{user_id}` — ephemeral presence/heartbeat record.
pub fn presence_key(user_id: &str) -> String {
    format!("registry:{user_id}")
}

/// `session:{user_id}:{session_id}` — ephemeral auth session record.
pub fn auth_session_key(user_id: &str, session_id: &str) -> String {
    format!("session:{user_id}:{session_id}")
}
