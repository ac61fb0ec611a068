//! Topic bus (§4.4, §5): process-wide typed publish/subscribe between
//! alert-emitting nodes and handler sinks. Subscribers get a bounded
//! buffer; a producer never blocks on a slow subscriber — full buffers
//! drop the event and increment a counter instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use super::state::AlertEvent;

pub struct Subscription {
    pub receiver: mpsc::Receiver<AlertEvent>,
    pub dropped: Arc<AtomicU64>,
}

struct Subscriber {
    sender: mpsc::Sender<AlertEvent>,
    dropped: Arc<AtomicU64>,
}

/// Shared-writer, shared-reader (§5): registration is rare (startup, hot
/// reconfig) so it lives behind an `RwLock`; publication on the hot path
/// only needs a read lock.
#[derive(Default)]
pub struct TopicBus {
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl TopicBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn subscribe(&self, topic: &str, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { sender: tx, dropped: dropped.clone() });
        Subscription { receiver: rx, dropped }
    }

    /// Publish to every subscriber on `event.topic`, in registration order.
    /// A full subscriber buffer drops the event (counted) rather than
    /// blocking the publisher or the other subscribers.
    pub async fn publish(&self, event: AlertEvent) {
        let topics = self.topics.read().await;
        let Some(subs) = topics.get(&event.topic) else {
            return;
        };
        for sub in subs {
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.sender.try_send(event.clone()) {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %event.topic, "subscriber buffer full, dropping alert event");
            }
        }
    }
}
