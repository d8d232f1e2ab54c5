//! Connection mode oracle — classifies a user as UI-attached or
//! backend-only from the heartbeat in the ephemeral store.
//!
//! The mode only gates live WS broadcasts; transcript persistence is
//! unconditional.

use chrono::{DateTime, Utc};
use serde_json::json;

use fiscus_stores::{paths, EphemeralStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Heartbeat is fresh: stream chunks live and persist.
    Ui,
    /// Heartbeat is stale or absent: persist only; the user catches up
    /// through their transcript subscription on reconnect.
    Backend,
}

impl ConnectionMode {
    pub fn is_ui(self) -> bool {
        matches!(self, Self::Ui)
    }
}

/// Record a heartbeat for a user, now.
pub async fn record_heartbeat(ephemeral: &dyn EphemeralStore, user_id: &str) {
    let result = ephemeral
        .merge(
            &paths::presence_key(user_id),
            json!({"heartbeat": {"last_heartbeat": Utc::now().to_rfc3339()}}),
        )
        .await;
    if let Err(e) = result {
        tracing::warn!(user_id, error = %e, "failed to record heartbeat");
    }
}

/// Classify a user at `now`. Fresh means strictly younger than the
/// threshold: a heartbeat aged exactly `fresh_secs` is already backend.
pub async fn classify(
    ephemeral: &dyn EphemeralStore,
    user_id: &str,
    fresh_secs: u64,
    now: DateTime<Utc>,
) -> ConnectionMode {
    let record = match ephemeral.get(&paths::presence_key(user_id)).await {
        Ok(Some(v)) => v,
        Ok(None) => return ConnectionMode::Backend,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "presence lookup failed");
            return ConnectionMode::Backend;
        }
    };

    let last_heartbeat = record
        .get("heartbeat")
        .and_then(|h| h.get("last_heartbeat"))
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    match last_heartbeat {
        Some(last) => {
            let age_ms = (now - last).num_milliseconds();
            if age_ms >= 0 && (age_ms as u64) < fresh_secs * 1000 {
                ConnectionMode::Ui
            } else {
                ConnectionMode::Backend
            }
        }
        None => ConnectionMode::Backend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscus_stores::MemoryEphemeralStore;

    async fn store_with_heartbeat(user_id: &str, at: DateTime<Utc>) -> MemoryEphemeralStore {
        let store = MemoryEphemeralStore::new();
        store
            .merge(
                &paths::presence_key(user_id),
                json!({"heartbeat": {"last_heartbeat": at.to_rfc3339()}}),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn fresh_heartbeat_is_ui() {
        let now = Utc::now();
        let store = store_with_heartbeat("u1", now - chrono::Duration::seconds(30)).await;
        assert_eq!(classify(&store, "u1", 300, now).await, ConnectionMode::Ui);
    }

    #[tokio::test]
    async fn heartbeat_at_exactly_the_threshold_is_backend() {
        let now = Utc::now();
        let store = store_with_heartbeat("u1", now - chrono::Duration::seconds(300)).await;
        assert_eq!(
            classify(&store, "u1", 300, now).await,
            ConnectionMode::Backend
        );
    }

    #[tokio::test]
    async fn one_second_inside_the_threshold_is_ui() {
        let now = Utc::now();
        let store = store_with_heartbeat("u1", now - chrono::Duration::seconds(299)).await;
        assert_eq!(classify(&store, "u1", 300, now).await, ConnectionMode::Ui);
    }

    #[tokio::test]
    async fn missing_record_is_backend() {
        let store = MemoryEphemeralStore::new();
        assert_eq!(
            classify(&store, "ghost", 300, Utc::now()).await,
            ConnectionMode::Backend
        );
    }

    #[tokio::test]
    async fn record_heartbeat_then_classify_is_ui() {
        let store = MemoryEphemeralStore::new();
        record_heartbeat(&store, "u1").await;
        assert_eq!(
            classify(&store, "u1", 300, Utc::now()).await,
            ConnectionMode::Ui
        );
    }
}
