//! Topic-addressed, best-effort broadcast bus.
//!
//! Delivery is non-blocking: a subscriber whose mailbox is full loses that one message,
//! other subscribers are unaffected. Uses a non-blocking `try_send`-and-drop idiom over a
//! dynamic set of string-addressed topics, kept in a `DashMap` so publish and subscribe
//! never contend on a single global lock.

mod topics;

pub use topics::{attention_topic, data_attention_topic, data_topic, sensor_attention_topic, signal_topic, DISCOVERY_SENSORS, SYSTEM_LOAD};

use crate::types::{AttentionLevel, LoadLevel, Measurement, SensorId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Measurement(Measurement),
    MeasurementsBatch { sensor_id: SensorId, measurements: Vec<Measurement> },
    AttentionChanged {
        sensor_id: SensorId,
        attribute_id: Option<String>,
        level: AttentionLevel,
    },
    SensorRegistered { sensor_id: SensorId, node: String },
    SensorUnregistered { sensor_id: SensorId, node: String },
    SystemLoadChanged {
        level: LoadLevel,
        multiplier: f64,
        scheduler_utilization: f64,
    },
}

/// Per-topic mailbox depth. Generous enough to absorb a burst without becoming a silent
/// unbounded queue.
const SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<Message>>,
}

/// A handle returned by `subscribe`. Pass it to `Bus::unsubscribe` to stop delivery;
/// dropping it without unsubscribing just leaves a channel registered that nobody reads
/// from — harmless, since `publish` never blocks on it.
pub struct Subscription {
    pub topic: String,
    id: u64,
    pub rx: mpsc::Receiver<Arc<Message>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }
}

#[derive(Default)]
pub struct Bus {
    topics: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics.entry(topic.clone()).or_default().push(Subscriber { id, tx });
        Subscription { topic, id, rx }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Some(mut subs) = self.topics.get_mut(&subscription.topic) {
            subs.retain(|s| s.id != subscription.id);
        }
    }

    /// Best-effort, non-blocking publish. A subscriber with a full mailbox drops this
    /// message and nothing else; other subscribers on the same topic are unaffected.
    pub fn publish(&self, topic: &str, msg: Message) {
        let Some(subs) = self.topics.get(topic) else {
            return;
        };
        if subs.is_empty() {
            return;
        }
        let msg = Arc::new(msg);
        for sub in subs.iter() {
            if sub.tx.try_send(msg.clone()).is_err() {
                log::debug!("pubsub: dropped message for subscriber {} on topic {topic}", sub.id);
            }
        }
    }

    /// Number of live subscribers on a topic, mostly useful for tests.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers() {
        let bus = Bus::new();
        let mut a = bus.subscribe("data:s1");
        let mut b = bus.subscribe("data:s1");

        bus.publish(
            "data:s1",
            Message::Measurement(Measurement::new("s1", "hr", 1000, crate::types::Value::Number(72.0))),
        );

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_to_topic_with_no_subscribers_is_a_noop() {
        let bus = Bus::new();
        bus.publish("data:ghost", Message::SensorUnregistered { sensor_id: "ghost".into(), node: "local".into() });
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = Bus::new();
        let sub = bus.subscribe("data:s1");
        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count("data:s1"), 0);
    }

    #[tokio::test]
    async fn full_mailbox_drops_only_for_that_subscriber() {
        let bus = Bus::new();
        let mut slow = bus.subscribe("data:s1");
        let mut fast = bus.subscribe("data:s1");

        for i in 0..(SUBSCRIBER_CAPACITY + 10) {
            bus.publish(
                "data:s1",
                Message::Measurement(Measurement::new("s1", "hr", i as i64, crate::types::Value::Number(i as f64))),
            );
        }

        // Drain the fast subscriber fully: it should have received every message that
        // still fit once the slow one's queue filled up — at least SUBSCRIBER_CAPACITY.
        let mut fast_count = 0;
        while fast.rx.try_recv().is_ok() {
            fast_count += 1;
        }
        assert!(fast_count >= SUBSCRIBER_CAPACITY);

        let mut slow_count = 0;
        while slow.rx.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, SUBSCRIBER_CAPACITY);
    }
}
