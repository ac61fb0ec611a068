//! `state-duration` / `state-count` nodes (§4.2): per group, track
//! contiguous runs where a boolean expression holds and emit the duration
//! (nanoseconds since the run started) or count of points in the run.
//! When a point is not currently in a run, the emitted field is `-1`
//! rather than absent, so downstream consumers don't need to special-case
//! a missing field.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vortex_grammar::{Evaluator, Expr};
use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Point, Value};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};
use crate::nodes::filter::point_vars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTrackMode {
    Duration,
    Count,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunState {
    run_start: Option<i64>,
    run_count: i64,
}

pub struct StateTrackNode {
    id: NodeId,
    mode: StateTrackMode,
    expr: Expr,
    as_name: String,
    evaluators: HashMap<String, Evaluator>,
    runs: HashMap<String, RunState>,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl StateTrackNode {
    pub fn new(
        id: NodeId,
        mode: StateTrackMode,
        expr: Expr,
        as_name: String,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        vortex_grammar::static_check(&expr).map_err(|e| VortexError::ValidationError(e.to_string()))?;
        Ok(Self {
            id,
            mode,
            expr,
            as_name,
            evaluators: HashMap::new(),
            runs: HashMap::new(),
            input,
            output,
            stats: NodeStats::new(),
        })
    }
}

#[async_trait]
impl Node for StateTrackNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        match self.mode {
            StateTrackMode::Duration => "state-duration",
            StateTrackMode::Count => "state-count",
        }
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
                    let evaluator = self.evaluators.entry(group.clone()).or_default();
                    let holds = match evaluator.eval(&self.expr, &vars) {
                        Ok(Value::Bool(b)) => b,
                        Ok(_) => false,
                        Err(e) => {
                            debug!(node = self.id, error = %e, "state predicate eval error");
                            self.stats.record_eval_error();
                            false
                        }
                    };
                    let run = self.runs.entry(group).or_default();
                    let value = if holds {
                        if run.run_start.is_none() {
                            run.run_start = Some(p.timestamp);
                            run.run_count = 0;
                        }
                        run.run_count += 1;
                        match self.mode {
                            StateTrackMode::Duration => {
                                (p.timestamp - run.run_start.unwrap()) as f64
                            }
                            StateTrackMode::Count => run.run_count as f64,
                        }
                    } else {
                        run.run_start = None;
                        run.run_count = 0;
                        -1.0
                    };
                    self.stats.record_processed();
                    let out = p.with_field(self.as_name.clone(), Value::Float(value));
                    if self.output.send(out).await.is_err() {
                        break;
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

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_shared::edge::edge;

    #[tokio::test]
    async fn state_count_tracks_contiguous_true_runs() {
        let expr = vortex_grammar::parse("usage_idle < 10").unwrap();
        let (in_tx, in_rx) = edge::<Point>(8);
        let (out_tx, mut out_rx) = edge::<Point>(8);
        let node = Box::new(
            StateTrackNode::new(1, StateTrackMode::Count, expr, "n".to_string(), in_rx, out_tx).unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        for (t, v) in [(1, 50.0), (2, 5.0), (3, 6.0), (4, 20.0)] {
            in_tx
                .send(Point::new("cpu", t).with_field("usage_idle", Value::Float(v)))
                .await
                .unwrap();
        }
        drop(in_tx);

        let mut counts = Vec::new();
        while let Some(EdgeMessage::Data(p)) = out_rx.recv().await {
            counts.push(p.fields.get("n").and_then(Value::as_f64).unwrap());
        }
        handle.await.unwrap().unwrap();
        assert_eq!(counts, vec![-1.0, 1.0, 2.0, -1.0]);
    }
}
