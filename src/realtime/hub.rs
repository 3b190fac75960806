//! In-process publish/subscribe registry for order events.
//!
//! One broadcast channel per topic, created lazily on first subscribe or
//! publish interest. Delivery is best-effort and at-most-once: events
//! published while a topic has no subscribers go nowhere, and a subscriber
//! that stops draining its receiver lags and loses the oldest events instead
//! of blocking the publisher. Within one topic each subscriber sees events
//! in publish order.
//!
//! The registry is process-local; running more than one server instance
//! requires an external broker behind the same interface.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::events::{OrderEvent, Topic};

/// Per-subscriber buffer; a consumer further behind than this drops events.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct BroadcastHub {
    topics: Arc<DashMap<Topic, broadcast::Sender<OrderEvent>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `topic`. The receiver only sees events published
    /// after this call; there is no replay.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<OrderEvent> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan `event` out to every current subscriber of `topic`.
    ///
    /// Publishing to a topic nobody watches is a silent no-op; a topic whose
    /// last subscriber is gone is pruned from the registry.
    pub fn publish(&self, topic: Topic, event: OrderEvent) {
        let stale = match self.topics.get(&topic) {
            Some(tx) => tx.send(event).is_err(),
            None => false,
        };
        // Ref dropped above; safe to take the shard lock again.
        if stale {
            self.topics.remove_if(&topic, |_, tx| tx.receiver_count() == 0);
        }
    }

    /// Current subscriber count for a topic (diagnostics and tests).
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, OrderStatus};
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = BroadcastHub::new();
        let mut rx = hub.subscribe(Topic::Orders);

        hub.publish(Topic::Orders, OrderEvent::OrderPaymentConfirmed { order_id: 1 });

        assert_eq!(
            rx.recv().await.unwrap(),
            OrderEvent::OrderPaymentConfirmed { order_id: 1 }
        );
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let hub = BroadcastHub::new();
        let mut early = hub.subscribe(Topic::Orders);

        hub.publish(Topic::Orders, OrderEvent::OrderPaymentConfirmed { order_id: 9 });

        let mut late = hub.subscribe(Topic::Orders);
        assert_eq!(
            early.recv().await.unwrap(),
            OrderEvent::OrderPaymentConfirmed { order_id: 9 }
        );
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let hub = BroadcastHub::new();
        let topic = Topic::Delivery(5);
        let mut rx = hub.subscribe(topic);

        hub.publish(
            topic,
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(36.80, 10.18),
            },
        );
        hub.publish(
            topic,
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(36.81, 10.19),
            },
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(
            first,
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(36.80, 10.18)
            }
        );
        assert_eq!(
            second,
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(36.81, 10.19)
            }
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let hub = BroadcastHub::new();
        // Must not panic or error.
        hub.publish(
            Topic::Delivery(404),
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(0.0, 0.0),
            },
        );
        assert_eq!(hub.subscriber_count(Topic::Delivery(404)), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = BroadcastHub::new();
        let mut order_3 = hub.subscribe(Topic::Delivery(3));
        let mut order_4 = hub.subscribe(Topic::Delivery(4));

        hub.publish(
            Topic::Delivery(3),
            OrderEvent::DeliveryUpdate {
                location: GeoPoint::new(1.0, 1.0),
            },
        );

        assert!(order_3.try_recv().is_ok());
        assert!(matches!(order_4.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn dead_topics_are_pruned_on_publish() {
        let hub = BroadcastHub::new();
        let topic = Topic::OrderConfirmation(8);
        let rx = hub.subscribe(topic);
        drop(rx);

        hub.publish(
            topic,
            OrderEvent::OrderConfirmation {
                status: OrderStatus::Confirmed,
            },
        );

        assert!(!hub.topics.contains_key(&topic));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = BroadcastHub::new();
        let topic = Topic::Delivery(1);
        let mut rx = hub.subscribe(topic);

        for i in 0..(CHANNEL_CAPACITY + 10) {
            hub.publish(
                topic,
                OrderEvent::DeliveryUpdate {
                    location: GeoPoint::new(0.0, i as f64 / 1000.0),
                },
            );
        }

        // The oldest events were dropped; the receiver reports the lag and
        // then keeps receiving the most recent ones.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 10),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }
}
