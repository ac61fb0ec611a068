//! `from` / `filter` / `where` node kinds (§4.2): stateless predicates over
//! a single Point stream. `from` matches structural predicates (measurement
//! name, tag equality); `where` evaluates a boolean expression over fields
//! and tags.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vortex_grammar::{Evaluator, Expr};
use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::Point;
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};
use crate::props::Properties;

/// `from().measurement('cpu').where(tag == val)`: structural predicate,
/// never observes an `EvalError` since it only inspects strings directly.
pub struct FromNode {
    id: NodeId,
    measurement: Option<String>,
    tag_equals: Vec<(String, String)>,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl FromNode {
    pub fn new(
        id: NodeId,
        props: &Properties,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        let measurement = props.get_str("measurement").ok().map(|s| s.to_string());
        Ok(Self {
            id,
            measurement,
            tag_equals: Vec::new(),
            input,
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
        for (k, v) in &self.tag_equals {
            if p.tags.get(k) != Some(v) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl Node for FromNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "from"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
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

/// `where(expr)`: boolean expression over point fields/tags, dropping
/// failing points. Maintains one `Evaluator` per group key so stateful
/// functions referenced in the predicate (rare, but legal) accumulate
/// independently per group, per §4.3/§4.2.
pub struct WhereNode {
    id: NodeId,
    expr: Expr,
    evaluators: HashMap<String, Evaluator>,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl WhereNode {
    pub fn new(
        id: NodeId,
        props: &Properties,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        let expr = props.get_expr("expr")?;
        vortex_grammar::static_check(&expr)
            .map_err(|e| VortexError::ValidationError(e.to_string()))?;
        Ok(Self {
            id,
            expr,
            evaluators: HashMap::new(),
            input,
            output,
            stats: NodeStats::new(),
        })
    }
}

#[async_trait]
impl Node for WhereNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "where"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    let group = p.group_key();
                    let vars = point_vars(&p);
                    let evaluator = self.evaluators.entry(group).or_default();
                    match evaluator.eval(&self.expr, &vars) {
                        Ok(v) => {
                            if matches!(v, vortex_shared::model::Value::Bool(true)) {
                                self.stats.record_processed();
                                if self.output.send(p).await.is_err() {
                                    break;
                                }
                            } else {
                                self.stats.record_dropped();
                            }
                        }
                        Err(e) => {
                            debug!(node = self.id, error = %e, "where predicate eval error");
                            self.stats.record_eval_error();
                        }
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

/// Build the variable scope an expression sees for a point: tags and
/// fields merged, fields taking precedence on key collision.
pub fn point_vars(p: &Point) -> HashMap<String, vortex_shared::model::Value> {
    let mut vars = HashMap::new();
    for (k, v) in &p.tags {
        vars.insert(k.clone(), vortex_shared::model::Value::Str(v.clone()));
    }
    for (k, v) in &p.fields {
        vars.insert(k.clone(), v.clone());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_shared::edge::edge;
    use vortex_shared::model::Value;

    #[tokio::test]
    async fn where_node_drops_failing_predicate() {
        let expr = vortex_grammar::parse("usage_idle < 10").unwrap();
        let (in_tx, in_rx) = edge::<Point>(8);
        let (out_tx, mut out_rx) = edge::<Point>(8);
        let props = Properties::new().with(
            "expr",
            crate::props::PropertyValue::Expr(expr),
        );
        let node = Box::new(WhereNode::new(1, &props, in_rx, out_tx).unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx
            .send(Point::new("cpu", 1).with_field("usage_idle", Value::Float(50.0)))
            .await
            .unwrap();
        in_tx
            .send(Point::new("cpu", 2).with_field("usage_idle", Value::Float(5.0)))
            .await
            .unwrap();
        drop(in_tx);

        let mut received = Vec::new();
        while let Some(EdgeMessage::Data(p)) = out_rx.recv().await {
            received.push(p);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].timestamp, 2);
    }

    #[tokio::test]
    async fn from_node_filters_by_measurement() {
        let (in_tx, in_rx) = edge::<Point>(8);
        let (out_tx, mut out_rx) = edge::<Point>(8);
        let props = Properties::new().with(
            "measurement",
            crate::props::PropertyValue::Str("cpu".to_string()),
        );
        let node = Box::new(FromNode::new(1, &props, in_rx, out_tx).unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx.send(Point::new("cpu", 1)).await.unwrap();
        in_tx.send(Point::new("mem", 2)).await.unwrap();
        drop(in_tx);

        let mut received = Vec::new();
        while let Some(EdgeMessage::Data(p)) = out_rx.recv().await {
            received.push(p);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].measurement, "cpu");
    }
}
