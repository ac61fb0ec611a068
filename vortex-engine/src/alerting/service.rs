//! Alert service (§2, §4.4): wires alert-emitting nodes to handler sinks
//! through the topic bus, retrying transient notifier failures and
//! counting drops once the retry policy is exhausted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use vortex_shared::resilience::retry::{retry_with_backoff, RetryPolicy};

use super::topic::TopicBus;
use crate::mediator::Notifier;

pub struct AlertService {
    bus: Arc<TopicBus>,
}

impl AlertService {
    pub fn new(bus: Arc<TopicBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> Arc<TopicBus> {
        self.bus.clone()
    }

    /// Subscribe `notifier` to `topic` and drain it for the lifetime of the
    /// returned task: each event is retried per `policy`; events that
    /// exhaust their attempts are dropped and counted in `dropped_events`
    /// (§7: "dropped and counted as `dropped-events`").
    pub async fn register_handler(
        &self,
        topic: &str,
        buffer: usize,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        dropped_events: Arc<AtomicU64>,
    ) -> JoinHandle<()> {
        let mut sub = self.bus.subscribe(topic, buffer).await;
        tokio::spawn(async move {
            while let Some(event) = sub.receiver.recv().await {
                let notifier = notifier.clone();
                let result = retry_with_backoff(&policy, || {
                    let notifier = notifier.clone();
                    let event = event.clone();
                    async move { notifier.send(&event).await }
                })
                .await;
                if result.is_err() {
                    dropped_events.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::state::{AlertEvent, AlertLevel};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use vortex_shared::VortexError;

    struct FlakyNotifier {
        calls: std::sync::atomic::AtomicU64,
        fail_times: u64,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, _event: &AlertEvent) -> Result<(), VortexError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n < self.fail_times {
                Err(VortexError::TransientIoError("simulated".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn handler_retries_transient_failures_then_succeeds() {
        let bus = TopicBus::new();
        let service = AlertService::new(bus.clone());
        let notifier = Arc::new(FlakyNotifier {
            calls: std::sync::atomic::AtomicU64::new(0),
            fail_times: 2,
        });
        let dropped = Arc::new(AtomicU64::new(0));
        let mut policy = RetryPolicy::default();
        policy.initial = std::time::Duration::from_millis(1);
        let handle = service
            .register_handler("cpu", 4, notifier.clone(), policy, dropped.clone())
            .await;

        bus.publish(AlertEvent {
            topic: "cpu".to_string(),
            series_id: "s1".to_string(),
            level: AlertLevel::Critical,
            previous_level: AlertLevel::Ok,
            timestamp: 0,
            message: "crit".to_string(),
            state_changed: true,
        })
        .await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(bus);
        handle.abort();
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        assert_eq!(notifier.calls.load(Ordering::Relaxed), 3);
    }
}
