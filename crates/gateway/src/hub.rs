//! WS hub — per-user fan-out of server-initiated events.
//!
//! Sockets subscribe with their authenticated user id; broadcasts are
//! try-sends, so one slow consumer never stalls the runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

const SUBSCRIBER_BUFFER: usize = 256;

/// Handle identifying one subscription, for unsubscribe on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct WsHub {
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, mpsc::Sender<Value>)>>>,
    next_id: AtomicU64,
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl WsHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for a user. The receiver feeds one socket's
    /// writer task.
    pub fn subscribe(&self, user_id: &str) -> (SubscriptionId, mpsc::Receiver<Value>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers
            .write()
            .entry(user_id.to_owned())
            .or_default()
            .push((id, tx));
        (id, rx)
    }

    pub fn unsubscribe(&self, user_id: &str, id: SubscriptionId) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(user_id) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                subscribers.remove(user_id);
            }
        }
    }

    /// Deliver an event to every live socket of a user. Returns the
    /// number of sockets reached. Full or closed channels are skipped;
    /// closed ones are pruned.
    pub fn broadcast(&self, user_id: &str, event: Value) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read();
            let Some(list) = subscribers.get(user_id) else {
                return 0;
            };
            for (id, tx) in list {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(user_id, "dropping event for slow subscriber");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }
        for id in dead {
            self.unsubscribe(user_id, id);
        }
        delivered
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers
            .read()
            .get(user_id)
            .map_or(0, |list| list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = WsHub::new();
        let (_a, mut rx_a) = hub.subscribe("u1");
        let (_b, mut rx_b) = hub.subscribe("u1");

        assert_eq!(hub.broadcast("u1", json!({"n": 1})), 2);
        assert_eq!(rx_a.recv().await.unwrap(), json!({"n": 1}));
        assert_eq!(rx_b.recv().await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn broadcast_to_unknown_user_is_zero() {
        let hub = WsHub::new();
        assert_eq!(hub.broadcast("ghost", json!({})), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = WsHub::new();
        let (id, mut rx) = hub.subscribe("u1");
        hub.unsubscribe("u1", id);
        assert_eq!(hub.broadcast("u1", json!({})), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned_on_broadcast() {
        let hub = WsHub::new();
        let (_id, rx) = hub.subscribe("u1");
        drop(rx);
        assert_eq!(hub.broadcast("u1", json!({})), 0);
        assert_eq!(hub.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let hub = WsHub::new();
        let (_a, mut rx_a) = hub.subscribe("u1");
        let (_b, mut rx_b) = hub.subscribe("u2");

        hub.broadcast("u1", json!({"for": "u1"}));
        assert_eq!(rx_a.recv().await.unwrap(), json!({"for": "u1"}));
        assert!(rx_b.try_recv().is_err());
    }
}
