//! Subscriber handles for broadcast delivery.
//!
//! A subscriber is the send side of a bounded channel owned by a
//! session. Delivery is `try_send`: a full buffer drops the message
//! (at-most-once within a session), a closed channel marks the
//! subscriber dead, and a subscriber that keeps dropping is evicted so
//! a stalled session cannot pin registry memory.

use peermesh_types::Key;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Consecutive failed deliveries after which a subscriber is treated
/// as dead even though its channel is still open.
const SLOW_EVICTION_THRESHOLD: u32 = 32;

/// Identity of one subscription handle.
///
/// Distinct from node identity: one node may hold several sessions,
/// each with its own subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Creates a fresh subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed state transition, as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// The key whose replica changed.
    pub key: Key,
    /// The new state, already encoded to its wire form.
    pub state: Value,
    /// The subscriber whose session caused the transition, if any.
    /// Delivery skips it: the command reply already carries the state.
    pub origin: Option<SubscriberId>,
}

/// Delivery counters for one subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Dropped,
    Dead,
}

/// Send-side handle for one session's broadcast stream.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<StateUpdate>>,
    delivered: u64,
    dropped: u64,
    consecutive_drops: u32,
}

impl Subscriber {
    /// Creates a subscriber with a buffer of `capacity` updates,
    /// returning the receive side for the owning session.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<StateUpdate>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
                delivered: 0,
                dropped: 0,
                consecutive_drops: 0,
            },
            rx,
        )
    }

    /// This subscriber's identity.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current delivery counters.
    #[must_use]
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.delivered,
            dropped: self.dropped,
        }
    }

    /// Attempts a non-blocking delivery.
    pub(crate) fn deliver(&mut self, update: Arc<StateUpdate>) -> Delivery {
        match self.tx.try_send(update) {
            Ok(()) => {
                self.delivered += 1;
                self.consecutive_drops = 0;
                Delivery::Delivered
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                self.consecutive_drops += 1;
                if self.consecutive_drops >= SLOW_EVICTION_THRESHOLD {
                    Delivery::Dead
                } else {
                    Delivery::Dropped
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peermesh_types::Key;
    use serde_json::json;

    fn update(key: &str) -> Arc<StateUpdate> {
        Arc::new(StateUpdate {
            key: Key::new(key).unwrap(),
            state: json!({"type": "g_counter", "payload": {"counts": {}}}),
            origin: None,
        })
    }

    #[tokio::test]
    async fn delivery_reaches_receiver() {
        let (mut sub, mut rx) = Subscriber::new(4);
        assert_eq!(sub.deliver(update("k")), Delivery::Delivered);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.key.as_str(), "k");
        assert_eq!(sub.stats().delivered, 1);
    }

    #[tokio::test]
    async fn full_buffer_drops_without_blocking() {
        let (mut sub, _rx) = Subscriber::new(1);
        assert_eq!(sub.deliver(update("k")), Delivery::Delivered);
        assert_eq!(sub.deliver(update("k")), Delivery::Dropped);
        assert_eq!(sub.stats().dropped, 1);
    }

    #[tokio::test]
    async fn closed_receiver_is_dead() {
        let (mut sub, rx) = Subscriber::new(4);
        drop(rx);
        assert_eq!(sub.deliver(update("k")), Delivery::Dead);
    }

    #[tokio::test]
    async fn sustained_backpressure_becomes_dead() {
        let (mut sub, _rx) = Subscriber::new(1);
        assert_eq!(sub.deliver(update("k")), Delivery::Delivered);
        let mut last = Delivery::Dropped;
        for _ in 0..SLOW_EVICTION_THRESHOLD {
            last = sub.deliver(update("k"));
        }
        assert_eq!(last, Delivery::Dead);
    }

    #[tokio::test]
    async fn successful_delivery_resets_drop_streak() {
        let (mut sub, mut rx) = Subscriber::new(1);
        sub.deliver(update("k"));
        sub.deliver(update("k")); // dropped
        rx.recv().await.unwrap();
        assert_eq!(sub.deliver(update("k")), Delivery::Delivered);
        sub.deliver(update("k")); // dropped again, streak restarted
        assert_eq!(sub.stats().dropped, 2);
    }

    #[test]
    fn subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
    }
}
