//! In-process event fan-out.
//!
//! The bus keeps a registry of per-consumer bounded channels. Publishing is
//! synchronous with frame arrival: every matching subscriber is handed the
//! envelope before the caller moves to the next frame, so per-subscriber
//! ordering matches wire order. Consumer code runs on the consumer's own
//! task, never on the delivery path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use quizcast_core::EventEnvelope;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::filter::EventFilter;

/// Per-subscriber channel capacity.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Maximum lifetime delivery drops before a slow subscriber is pruned.
const MAX_DELIVERY_DROPS: u64 = 100;

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<EventEnvelope>,
    drops: AtomicU64,
}

#[derive(Default)]
struct Registry {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
}

impl Registry {
    /// Remove a subscription. No-op if already gone.
    fn remove(&self, id: Uuid) {
        let _ = self.subscribers.write().remove(&id);
    }
}

/// Fan-out hub delivering decoded envelopes to every matching subscription.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Purely a local table update; the transport is
    /// never touched.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let _ = self.registry.subscribers.write().insert(
            id,
            Subscriber {
                filter,
                tx,
                drops: AtomicU64::new(0),
            },
        );
        debug!(subscription_id = %id, "subscription registered");
        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Deliver an envelope to every subscription whose filter matches.
    ///
    /// A full per-subscriber channel drops that one delivery; a subscriber
    /// exceeding the lifetime drop threshold, or whose receiver is gone, is
    /// pruned from the registry.
    pub fn publish(&self, envelope: &EventEnvelope) {
        let mut to_prune = Vec::new();
        {
            let subs = self.registry.subscribers.read();
            let mut recipients = 0u32;
            for (id, sub) in subs.iter() {
                if !sub.filter.matches(envelope) {
                    continue;
                }
                recipients += 1;
                match sub.tx.try_send(envelope.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Closed(_)) => to_prune.push(*id),
                    Err(TrySendError::Full(_)) => {
                        counter!("quizcast_delivery_drops_total").increment(1);
                        let drops = sub.drops.fetch_add(1, Ordering::Relaxed) + 1;
                        if drops >= MAX_DELIVERY_DROPS {
                            warn!(subscription_id = %id, drops, "pruning slow subscriber");
                            to_prune.push(*id);
                        } else {
                            warn!(subscription_id = %id, total_drops = drops, "subscriber channel full; delivery dropped");
                        }
                    }
                }
            }
            debug!(event_type = %envelope.event_type, recipients, "published event");
        }
        counter!("quizcast_events_published_total").increment(1);
        if !to_prune.is_empty() {
            let mut subs = self.registry.subscribers.write();
            for id in &to_prune {
                let _ = subs.remove(id);
            }
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.read().len()
    }
}

/// A per-consumer lease on the bus.
///
/// Receives matching envelopes in wire arrival order. Deregisters on
/// [`Subscription::dispose`] or drop; disposal is the only destruction path
/// and is idempotent.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<EventEnvelope>,
    registry: Arc<Registry>,
}

impl Subscription {
    /// Opaque unique handle for this subscription.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next matching envelope, in wire order.
    ///
    /// Returns `None` once the subscription has been pruned and the buffer is
    /// drained.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Deregister now instead of at drop.
    pub fn dispose(self) {
        // Drop does the removal.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quizcast_core::envelope::event_types;
    use serde_json::json;

    fn envelope(event_type: &str, data: serde_json::Value) -> EventEnvelope {
        EventEnvelope::now(event_type, data)
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        bus.publish(&envelope("QUIZ_STARTED", json!({"quizId": "42"})));
        let got = sub.recv().await.unwrap();
        assert_eq!(got.event_type, "QUIZ_STARTED");
    }

    #[tokio::test]
    async fn type_filter_selects_subset() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::for_type(event_types::QUIZ_STARTED));
        bus.publish(&envelope("QUIZ_STARTED", json!({})));
        bus.publish(&envelope("QUIZ_ENDED", json!({})));
        bus.publish(&envelope("QUIZ_STARTED", json!({})));
        assert_eq!(sub.try_recv().unwrap().event_type, "QUIZ_STARTED");
        assert_eq!(sub.try_recv().unwrap().event_type, "QUIZ_STARTED");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn per_subscriber_order_matches_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        for i in 0..5 {
            bus.publish(&envelope("SUBMISSION_RECEIVED", json!({"seq": i})));
        }
        for i in 0..5 {
            assert_eq!(sub.try_recv().unwrap().data["seq"], i);
        }
    }

    #[tokio::test]
    async fn independent_subscribers_each_get_matching_subset() {
        let bus = EventBus::new();
        let mut started = bus.subscribe(EventFilter::for_type("QUIZ_STARTED"));
        let mut room = bus.subscribe(EventFilter::for_room("quiz:42"));
        let mut everything = bus.subscribe(EventFilter::all());

        bus.publish(&envelope("QUIZ_STARTED", json!({"quizId": "42"})));
        bus.publish(&envelope("QUIZ_ENDED", json!({"quizId": "7"})));

        assert!(started.try_recv().is_some());
        assert!(started.try_recv().is_none());

        assert!(room.try_recv().is_some());
        assert!(room.try_recv().is_none());

        assert!(everything.try_recv().is_some());
        assert!(everything.try_recv().is_some());
        assert!(everything.try_recv().is_none());
    }

    #[tokio::test]
    async fn dispose_stops_delivery() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventFilter::all());
        assert_eq!(bus.subscriber_count(), 1);
        sub.dispose();
        assert_eq!(bus.subscriber_count(), 0);
        // Publishing after disposal must not fail.
        bus.publish(&envelope("QUIZ_STARTED", json!({})));
    }

    #[tokio::test]
    async fn drop_deregisters() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dispose_between_publishes_receives_nothing_later() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        bus.publish(&envelope("QUIZ_STARTED", json!({"seq": 0})));
        assert!(sub.try_recv().is_some());
        sub.dispose();
        bus.publish(&envelope("QUIZ_STARTED", json!({"seq": 1})));
        // No live handle; just assert the registry no longer tracks it.
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dispose_during_delivery_from_consumer_task() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    bus.publish(&envelope("QUIZ_STARTED", json!({"seq": i})));
                    tokio::task::yield_now().await;
                }
            })
        };
        // Consume a few then dispose mid-stream; the publisher must be
        // unaffected.
        let _ = sub.recv().await;
        sub.dispose();
        publisher.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_registry() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut sub = clone.subscribe(EventFilter::all());
        bus.publish(&envelope("QUIZ_STARTED", json!({})));
        assert!(sub.try_recv().is_some());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_then_pruned() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        // Fill the channel, then exceed the lifetime drop threshold.
        let total = SUBSCRIPTION_BUFFER as u64 + MAX_DELIVERY_DROPS;
        for i in 0..total {
            bus.publish(&envelope("QUIZ_STARTED", json!({"seq": i})));
        }
        assert_eq!(bus.subscriber_count(), 0);
        // Buffered envelopes are still drainable, in order.
        assert_eq!(sub.try_recv().unwrap().data["seq"], 0);
    }

    #[tokio::test]
    async fn fast_subscriber_never_pruned() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        for i in 0..(SUBSCRIPTION_BUFFER * 2) {
            bus.publish(&envelope("QUIZ_STARTED", json!({"seq": i})));
            while sub.try_recv().is_some() {}
        }
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn panicking_predicate_does_not_break_other_subscribers() {
        let bus = EventBus::new();
        let mut bad = bus.subscribe(EventFilter::all().with_predicate(|_| panic!("boom")));
        let mut good = bus.subscribe(EventFilter::all());
        bus.publish(&envelope("QUIZ_STARTED", json!({})));
        assert!(bad.try_recv().is_none());
        assert!(good.try_recv().is_some());
    }

    #[test]
    fn slow_subscriber_threshold_constant_value() {
        assert_eq!(MAX_DELIVERY_DROPS, 100);
    }
}
