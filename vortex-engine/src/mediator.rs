//! Narrow mediator interfaces passed to nodes at `init` (§6, §9): "no
//! ambient globals in the node implementation." `KvStore` and `Clock` live
//! in `vortex-shared` since they're useful outside the engine too;
//! `TsdbQueryClient` and `Notifier` are engine-specific (they speak in
//! terms of `Row` and `AlertEvent`) and live here.

use std::sync::Mutex;

use async_trait::async_trait;

use vortex_shared::model::Batch;
use vortex_shared::resilience::RetryPolicy;
use vortex_shared::{Clock, VortexError};

use crate::alerting::state::AlertEvent;
use crate::alerting::{InhibitorRegistry, TopicBus};
use crate::nodes::sinks::HttpOutTable;

/// One row of a batch-source query result, prior to being shaped into a
/// `Point`.
#[derive(Debug, Clone)]
pub struct Row {
    pub timestamp: i64,
    pub fields: std::collections::BTreeMap<String, vortex_shared::model::Value>,
}

#[async_trait]
pub trait TsdbQueryClient: Send + Sync {
    async fn query(&self, query: &str, window: (i64, i64)) -> Result<Vec<Row>, VortexError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<(), VortexError>;
}

/// Write side of an external time-series database (`influxdb-out`).
#[async_trait]
pub trait InfluxWriteClient: Send + Sync {
    async fn write(&self, batch: &Batch) -> Result<(), VortexError>;
}

/// Write side of a message broker (`kafka-out`).
#[async_trait]
pub trait KafkaWriteClient: Send + Sync {
    async fn publish(&self, topic: &str, batch: &Batch) -> Result<(), VortexError>;
}

/// Deterministic test double for `influxdb-out`/`kafka-out`: records every
/// batch it receives instead of talking to a real dependency, optionally
/// failing the first `fail_times` calls with a transient error.
#[derive(Default)]
pub struct RecordingWriteClient {
    received: Mutex<Vec<Batch>>,
    fail_times: u64,
    calls: std::sync::atomic::AtomicU64,
}

impl RecordingWriteClient {
    pub fn new(fail_times: u64) -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            fail_times,
            calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn received(&self) -> Vec<Batch> {
        self.received.lock().expect("received mutex poisoned").clone()
    }

    fn record_or_fail(&self, batch: &Batch) -> Result<(), VortexError> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if n < self.fail_times {
            return Err(VortexError::TransientIoError("simulated".to_string()));
        }
        self.received.lock().expect("received mutex poisoned").push(batch.clone());
        Ok(())
    }
}

#[async_trait]
impl InfluxWriteClient for RecordingWriteClient {
    async fn write(&self, batch: &Batch) -> Result<(), VortexError> {
        self.record_or_fail(batch)
    }
}

#[async_trait]
impl KafkaWriteClient for RecordingWriteClient {
    async fn publish(&self, _topic: &str, batch: &Batch) -> Result<(), VortexError> {
        self.record_or_fail(batch)
    }
}

/// Deterministic test double for `batch-source`: returns a fixed row set
/// regardless of query text, ignoring the requested window.
pub struct FixtureTsdbClient {
    rows: Vec<Row>,
}

impl FixtureTsdbClient {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl TsdbQueryClient for FixtureTsdbClient {
    async fn query(&self, _query: &str, _window: (i64, i64)) -> Result<Vec<Row>, VortexError> {
        Ok(self.rows.clone())
    }
}

/// Default `log-out`-style notifier: writes the event via `tracing`
/// instead of delivering it to a real external system.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &AlertEvent) -> Result<(), VortexError> {
        tracing::info!(
            topic = %event.topic,
            series = %event.series_id,
            level = %event.level,
            "alert event"
        );
        Ok(())
    }
}

/// The narrow bundle of shared, process-wide collaborators every node
/// construction needs (§9 "global mutable state": "exposed only through a
/// narrow mediator object passed to each node at `init`"). `Compiler` holds
/// one of these and clones the `Arc`s into each node it constructs.
#[derive(Clone)]
pub struct Mediators {
    pub tsdb_client: std::sync::Arc<dyn TsdbQueryClient>,
    pub influx_client: std::sync::Arc<dyn InfluxWriteClient>,
    pub kafka_client: std::sync::Arc<dyn KafkaWriteClient>,
    pub topic_bus: std::sync::Arc<TopicBus>,
    pub inhibitors: std::sync::Arc<InhibitorRegistry>,
    pub http_table: std::sync::Arc<HttpOutTable>,
    pub clock: std::sync::Arc<dyn Clock>,
    pub retry_policy: RetryPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::state::AlertLevel;

    #[tokio::test]
    async fn fixture_client_returns_configured_rows() {
        let client = FixtureTsdbClient::new(vec![Row {
            timestamp: 1,
            fields: Default::default(),
        }]);
        let rows = client.query("SELECT 1", (0, 10)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn recording_write_client_fails_then_succeeds() {
        let client = RecordingWriteClient::new(1);
        let batch = Batch::new("m", "", 0, 1, Default::default());
        assert!(InfluxWriteClient::write(&client, &batch).await.is_err());
        assert!(InfluxWriteClient::write(&client, &batch).await.is_ok());
        assert_eq!(client.received().len(), 1);
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let notifier = LogNotifier;
        let event = AlertEvent {
            topic: "cpu".to_string(),
            series_id: "s1".to_string(),
            level: AlertLevel::Critical,
            previous_level: AlertLevel::Ok,
            timestamp: 0,
            message: "crit".to_string(),
            state_changed: true,
        };
        notifier.send(&event).await.unwrap();
    }
}
