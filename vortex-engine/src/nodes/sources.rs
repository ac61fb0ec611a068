//! `stream-source` / `batch-source` node kinds (§4.2): the two root kinds
//! a compiled graph may start from; the compiler rejects a program that
//! mixes their semantics on a single edge (§4.1).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Batch, Dimensions, Point};
use vortex_shared::{Clock, VortexError};

use crate::kernel::{Node, NodeId, NodeStats};
use crate::mediator::TsdbQueryClient;
use crate::props::Properties;

/// Filters the task's ingest feed down to the points this task is
/// entitled to see. The dbrp scope itself is enforced upstream by the
/// ingest dispatcher (an external collaborator, §6); this node applies
/// the per-stage structural predicate (measurement, tag equality) the
/// way `from` does further downstream.
pub struct StreamSourceNode {
    id: NodeId,
    measurement: Option<String>,
    tag_equals: Vec<(String, String)>,
    ingest: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl StreamSourceNode {
    pub fn new(
        id: NodeId,
        ingest: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Self {
        Self {
            id,
            measurement: None,
            tag_equals: Vec::new(),
            ingest,
            output,
            stats: NodeStats::new(),
        }
    }

    pub fn from_properties(
        id: NodeId,
        props: &Properties,
        ingest: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        let measurement = props.get_str("measurement").ok().map(|s| s.to_string());
        Ok(Self {
            id,
            measurement,
            tag_equals: Vec::new(),
            ingest,
            output,
            stats: NodeStats::new(),
        })
    }

    fn matches(&self, p: &Point) -> bool {
        if let Some(m) = &self.measurement {
            if &p.measurement != m {
                return false;
            }
        }
        self.tag_equals.iter().all(|(k, v)| p.tags.get(k) == Some(v))
    }
}

#[async_trait]
impl Node for StreamSourceNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "stream-source"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.ingest.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    if self.matches(&p) {
                        self.stats.record_processed();
                        if self.output.send(p).await.is_err() {
                            break;
                        }
                    } else {
                        self.stats.record_dropped();
                    }
                }
                Some(EdgeMessage::Barrier(w)) => {
                    let _ = self.output.send_barrier(w).await;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    fn restore(&mut self, _bytes: &[u8]) {}

    fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }
}

/// Issues `query` against `client` every `period`, reshapes each returned
/// row into a `Point`, and emits the window as a single `Batch`. Ticks are
/// advisory (`MissedTickBehavior::Skip`, §4.2): a tick missed because the
/// previous query round-trip overran never accumulates a backlog.
pub struct BatchSourceNode {
    id: NodeId,
    query: String,
    measurement: String,
    period: Duration,
    client: Arc<dyn TsdbQueryClient>,
    clock: Arc<dyn Clock>,
    output: EdgeSender<Batch>,
    stats: Arc<NodeStats>,
}

impl BatchSourceNode {
    pub fn new(
        id: NodeId,
        query: String,
        measurement: String,
        period: Duration,
        client: Arc<dyn TsdbQueryClient>,
        clock: Arc<dyn Clock>,
        output: EdgeSender<Batch>,
    ) -> Self {
        Self {
            id,
            query,
            measurement,
            period,
            client,
            clock,
            output,
            stats: NodeStats::new(),
        }
    }
}

#[async_trait]
impl Node for BatchSourceNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "batch-source"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let end = self.clock.now_nanos();
                    let begin = end - self.period.as_nanos() as i64;
                    match self.client.query(&self.query, (begin, end)).await {
                        Ok(rows) => {
                            let points: Vec<Point> = rows
                                .into_iter()
                                .map(|row| {
                                    let mut p = Point::new(self.measurement.clone(), row.timestamp);
                                    for (k, v) in row.fields {
                                        p = p.with_field(k, v);
                                    }
                                    p
                                })
                                .collect();
                            let batch = Batch::new(
                                self.measurement.clone(),
                                String::new(),
                                begin,
                                end,
                                Dimensions::ungrouped(),
                            )
                            .with_points(points);
                            self.stats.record_processed();
                            if self.output.send(batch).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(node = self.id, error = %e, "batch-source query failed");
                            self.stats.record_error();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    fn restore(&mut self, _bytes: &[u8]) {}

    fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }
}

/// Row fields keyed by name, used by tests constructing a `BatchSourceNode`
/// against a `FixtureTsdbClient` without going through the pipeline parser.
pub fn row_fields(pairs: &[(&str, vortex_shared::model::Value)]) -> BTreeMap<String, vortex_shared::model::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_shared::edge::edge;
    use vortex_shared::model::Value;
    use vortex_shared::SystemClock;

    use crate::mediator::{FixtureTsdbClient, Row};

    #[tokio::test]
    async fn stream_source_filters_by_measurement() {
        let (in_tx, in_rx) = edge::<Point>(8);
        let (out_tx, mut out_rx) = edge::<Point>(8);
        let node = Box::new(StreamSourceNode::new(1, in_rx, out_tx));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx.send(Point::new("cpu", 1)).await.unwrap();
        drop(in_tx);

        let mut received = Vec::new();
        while let Some(EdgeMessage::Data(p)) = out_rx.recv().await {
            received.push(p);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(received.len(), 1);
    }

    #[tokio::test]
    async fn batch_source_emits_one_batch_from_query_result() {
        let client: Arc<dyn TsdbQueryClient> = Arc::new(FixtureTsdbClient::new(vec![Row {
            timestamp: 1,
            fields: row_fields(&[("value", Value::Float(2.0))]),
        }]));
        let (out_tx, mut out_rx) = edge::<Batch>(8);
        let node = Box::new(BatchSourceNode::new(
            1,
            "SELECT value FROM m".to_string(),
            "m".to_string(),
            Duration::from_millis(5),
            client,
            Arc::new(SystemClock),
            out_tx,
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        let batch = tokio::time::timeout(Duration::from_secs(1), out_rx.recv())
            .await
            .unwrap();
        cancel.cancel();
        handle.await.unwrap().unwrap();
        match batch {
            Some(EdgeMessage::Data(b)) => assert_eq!(b.points.len(), 1),
            other => panic!("expected a batch, got {other:?}"),
        }
    }
}
