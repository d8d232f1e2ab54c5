//! Per-thread business context — everything a long-process payload needs
//! beyond the model-visible identifiers.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DMS_SYSTEM: &str = "google_drive";
pub const DEFAULT_COMMUNICATION_MODE: &str = "webhook";
pub const DEFAULT_LOG_COMMUNICATION_MODE: &str = "firebase";

/// Business-level configuration for one thread, assembled by the context
/// loader from the client, mandate, and ERP records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub client_uuid: String,
    pub company_id: String,
    pub company_name: String,
    pub mandate_path: String,
    pub dms_system: String,
    pub communication_mode: String,
    pub log_communication_mode: String,
    pub drive_space_parent_id: String,
    pub bank_erp: String,
}

impl ThreadContext {
    /// Deterministic client uuid used when the client record is missing.
    pub fn fallback_client_uuid(user_id: &str) -> String {
        let prefix: String = user_id.chars().take(8).collect();
        format!("fallback_{prefix}")
    }

    /// A context is dispatch-ready once the fields every worker payload
    /// requires are populated.
    pub fn is_dispatch_ready(&self) -> bool {
        !self.client_uuid.is_empty() && !self.mandate_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uuid_takes_first_eight_chars() {
        assert_eq!(
            ThreadContext::fallback_client_uuid("abcdefghijkl"),
            "fallback_abcdefgh"
        );
        assert_eq!(ThreadContext::fallback_client_uuid("u1"), "fallback_u1");
    }

    #[test]
    fn empty_context_is_not_dispatch_ready() {
        assert!(!ThreadContext::default().is_dispatch_ready());
    }

    #[test]
    fn context_with_client_and_mandate_is_ready() {
        let ctx = ThreadContext {
            client_uuid: "cu-1".into(),
            mandate_path: "bo_clients/cu-1/mandates/m1".into(),
            ..Default::default()
        };
        assert!(ctx.is_dispatch_ready());
    }
}
