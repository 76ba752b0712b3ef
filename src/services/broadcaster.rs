//! Lifecycle Broadcaster - per-order status fan-out
//!
//! One subscriber channel per order id. Publishing is fire-and-forget: no
//! history is kept, a missing or closed channel silently drops the event, and
//! the caller is never blocked.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{LifecycleEvent, LifecycleStatus};

/// Channel a subscriber receives its order's events on
pub type EventChannel = mpsc::UnboundedSender<LifecycleEvent>;

/// Destination for lifecycle events emitted by the pipeline
pub trait EventSink: Send + Sync {
    /// Deliver at most once; must not block or fail.
    fn publish(&self, event: LifecycleEvent);
}

/// Identifies one registration, so a disconnecting subscriber only removes itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    tx: EventChannel,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BroadcasterStats {
    pub subscribers: usize,
    pub delivered: u64,
    pub dropped: u64,
}

/// Concurrency-safe registry of order id -> subscriber channel
#[derive(Default)]
pub struct LifecycleBroadcaster {
    subscribers: DashMap<String, Subscriber>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl LifecycleBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` for `order_id`, replacing any earlier subscriber.
    pub fn subscribe(&self, order_id: &str, tx: EventChannel) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self
            .subscribers
            .insert(order_id.to_string(), Subscriber { id, tx })
            .is_some()
        {
            debug!("Replaced existing subscriber for order {}", order_id);
        }
        id
    }

    /// Create a fresh channel and register its sending half.
    pub fn channel(
        &self,
        order_id: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.subscribe(order_id, tx), rx)
    }

    /// Drop whatever subscriber is registered for `order_id`.
    pub fn unsubscribe(&self, order_id: &str) -> bool {
        self.subscribers.remove(order_id).is_some()
    }

    /// Drop the registration only if it is still `id` (not replaced since).
    pub fn release(&self, order_id: &str, id: SubscriptionId) -> bool {
        self.subscribers
            .remove_if(order_id, |_, sub| sub.id == id)
            .is_some()
    }

    pub fn is_subscribed(&self, order_id: &str) -> bool {
        self.subscribers.contains_key(order_id)
    }

    /// Publish `status` for `order_id` with optional details
    pub fn publish_status(
        &self,
        order_id: &str,
        status: LifecycleStatus,
        details: Option<Map<String, Value>>,
    ) {
        self.publish(LifecycleEvent {
            order_id: order_id.to_string(),
            status,
            details,
        });
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            subscribers: self.subscribers.len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl EventSink for LifecycleBroadcaster {
    fn publish(&self, event: LifecycleEvent) {
        let order_id = event.order_id.clone();

        // Clone the sender out so the shard lock is not held across send
        let target = self
            .subscribers
            .get(&order_id)
            .map(|sub| (sub.id, sub.tx.clone()));

        let Some((id, tx)) = target else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match tx.send(event) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                // Receiver went away; forget it so later events short-circuit
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.release(&order_id, id);
                debug!("Subscriber for order {} closed, event dropped", order_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_publish_without_subscriber_is_noop() {
        let b = LifecycleBroadcaster::new();
        b.publish_status("nobody", LifecycleStatus::Pending, None);
        assert_eq!(b.stats().dropped, 1);
        assert_eq!(b.stats().delivered, 0);
    }

    #[tokio::test]
    async fn test_delivers_only_to_matching_order() {
        let b = LifecycleBroadcaster::new();
        let (_, mut rx_a) = b.channel("a");
        let (_, mut rx_b) = b.channel("b");

        b.publish_status("a", LifecycleStatus::Pending, None);
        b.publish_status("b", LifecycleStatus::Routing, None);

        assert_eq!(rx_a.recv().await.unwrap().status, LifecycleStatus::Pending);
        assert_eq!(rx_b.recv().await.unwrap().status, LifecycleStatus::Routing);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_subscriber_replaces_first() {
        let b = LifecycleBroadcaster::new();
        let (first, mut rx1) = b.channel("x");
        let (_, mut rx2) = b.channel("x");

        b.publish_status("x", LifecycleStatus::Pending, None);
        assert!(rx2.recv().await.is_some());
        // first sender was dropped with the replaced registration
        assert!(rx1.recv().await.is_none());

        // stale release must not evict the newer subscriber
        assert!(!b.release("x", first));
        assert!(b.is_subscribed("x"));
    }

    #[test]
    fn test_closed_channel_is_swallowed_and_removed() {
        let b = LifecycleBroadcaster::new();
        let (_, rx) = b.channel("gone");
        drop(rx);

        b.publish_status("gone", LifecycleStatus::Pending, None);
        assert!(!b.is_subscribed("gone"));
        assert_eq!(b.stats().dropped, 1);
    }

    #[test]
    fn test_unsubscribe() {
        let b = LifecycleBroadcaster::new();
        let (_, _rx) = b.channel("o");
        assert!(b.unsubscribe("o"));
        assert!(!b.unsubscribe("o"));
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_subscribe() {
        let b = Arc::new(LifecycleBroadcaster::new());
        let mut receivers = Vec::new();
        for i in 0..32 {
            receivers.push(b.channel(&format!("order-{}", i)).1);
        }

        let mut handles = Vec::new();
        for i in 0..32 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("order-{}", i);
                for status in LifecycleStatus::SUCCESS_PATH {
                    b.publish_status(&id, status, None);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for (i, rx) in receivers.iter_mut().enumerate() {
            for expected in LifecycleStatus::SUCCESS_PATH {
                let event = rx.recv().await.unwrap();
                assert_eq!(event.order_id, format!("order-{}", i));
                assert_eq!(event.status, expected);
            }
        }
        assert_eq!(b.stats().delivered, 32 * 5);
    }
}
