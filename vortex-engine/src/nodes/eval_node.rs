//! `eval` node (§4.2): evaluates named numeric expressions per message and
//! writes the results as new fields, operating per group.

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
use crate::nodes::filter::point_vars;
use crate::props::Properties;

pub struct EvalNode {
    id: NodeId,
    /// (output field name, expression) pairs, evaluated in declaration order
    /// so later expressions may reference earlier outputs.
    assignments: Vec<(String, Expr)>,
    quiet: bool,
    evaluators: HashMap<String, Evaluator>,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl EvalNode {
    pub fn new(
        id: NodeId,
        assignments: Vec<(String, Expr)>,
        quiet: bool,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        for (_, expr) in &assignments {
            vortex_grammar::static_check(expr).map_err(|e| VortexError::ValidationError(e.to_string()))?;
        }
        Ok(Self {
            id,
            assignments,
            quiet,
            evaluators: HashMap::new(),
            input,
            output,
            stats: NodeStats::new(),
        })
    }

    pub fn from_properties(
        id: NodeId,
        props: &Properties,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        let names = props.get_str_list("as")?;
        let quiet = props.get_bool_or("quiet", false);
        let mut assignments = Vec::new();
        for name in names {
            let key = format!("expr:{name}");
            let expr = props.get_expr(&key)?;
            assignments.push((name, expr));
        }
        Self::new(id, assignments, quiet, input, output)
    }
}

#[async_trait]
impl Node for EvalNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "eval"
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
                    let mut vars = point_vars(&p);
                    let evaluator = self.evaluators.entry(group).or_default();
                    let mut failed = false;
                    let mut new_fields = Vec::with_capacity(self.assignments.len());
                    for (name, expr) in &self.assignments {
                        match evaluator.eval(expr, &vars) {
                            Ok(v) => {
                                vars.insert(name.clone(), v.clone());
                                new_fields.push((name.clone(), v));
                            }
                            Err(e) => {
                                debug!(node = self.id, field = %name, error = %e, "eval expression error");
                                self.stats.record_eval_error();
                                failed = true;
                                break;
                            }
                        }
                    }
                    if failed {
                        if !self.quiet {
                            self.stats.record_dropped();
                        }
                        continue;
                    }
                    let mut out = p;
                    for (name, v) in new_fields {
                        out = out.with_field(name, v);
                    }
                    self.stats.record_processed();
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
