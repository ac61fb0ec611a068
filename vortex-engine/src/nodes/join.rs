//! `join` node (§4.2): multi-input, aligns messages across inputs by event
//! time within a tolerance and fills missing inputs per a fill policy.
//!
//! Each input fills one "slot" per group. A new arrival is merged with
//! whatever other slots already hold a point within `tolerance` of it; once
//! merged, the consumed slots are cleared so the next arrival starts a new
//! alignment window for that group. `fill = none` never emits a row with a
//! missing slot; `null`/`numeric_default` accept an incomplete row once all
//! inputs have had a chance to report (on barrier, i.e. watermark advance).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::select_all;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Dimensions, Point, Value};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillPolicy {
    None,
    Null,
    NumericDefault(f64),
}

struct GroupSlots {
    slots: Vec<Option<Point>>,
}

impl GroupSlots {
    fn new(n: usize) -> Self {
        Self { slots: vec![None; n] }
    }

    fn aligned_within(&self, tolerance_ns: i64) -> bool {
        let timestamps: Vec<i64> = self.slots.iter().flatten().map(|p| p.timestamp).collect();
        if timestamps.len() != self.slots.len() {
            return false;
        }
        let min = *timestamps.iter().min().unwrap();
        let max = *timestamps.iter().max().unwrap();
        max - min <= tolerance_ns
    }
}

pub struct JoinNode {
    id: NodeId,
    input_names: Vec<String>,
    tolerance_ns: i64,
    fill: FillPolicy,
    groups: HashMap<String, GroupSlots>,
    inputs: Vec<EdgeReceiver<Point>>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl JoinNode {
    pub fn new(
        id: NodeId,
        input_names: Vec<String>,
        tolerance_ns: i64,
        fill: FillPolicy,
        inputs: Vec<EdgeReceiver<Point>>,
        output: EdgeSender<Point>,
    ) -> Self {
        Self {
            id,
            input_names,
            tolerance_ns,
            fill,
            groups: HashMap::new(),
            inputs,
            output,
            stats: NodeStats::new(),
        }
    }

    fn merge(&self, key: &str, slots: &[Option<Point>]) -> Option<Point> {
        let any = slots.iter().flatten().next()?;
        let timestamp = slots
            .iter()
            .flatten()
            .map(|p| p.timestamp)
            .max()
            .unwrap_or(any.timestamp);
        let mut out = Point::new(any.measurement.clone(), timestamp).with_dimensions(Dimensions::default());
        for (name, slot) in self.input_names.iter().zip(slots.iter()) {
            match slot {
                Some(p) => {
                    for (field_name, v) in &p.fields {
                        out = out.with_field(format!("{name}.{field_name}"), v.clone());
                    }
                    for (tag_name, v) in &p.tags {
                        out = out.with_tag(tag_name.clone(), v.clone());
                    }
                }
                None => match self.fill {
                    FillPolicy::None => return None,
                    FillPolicy::Null => {
                        out = out.with_field(format!("{name}.value"), Value::Bool(false));
                    }
                    FillPolicy::NumericDefault(d) => {
                        out = out.with_field(format!("{name}.value"), Value::Float(d));
                    }
                },
            }
        }
        let _ = key;
        Some(out)
    }
}

#[async_trait]
impl Node for JoinNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "join"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        let n = self.inputs.len();
        let mut inputs: Vec<EdgeReceiver<Point>> = self.inputs.drain(..).collect();
        while !inputs.is_empty() {
            let recv_futs: Vec<_> = inputs.iter_mut().map(|rx| Box::pin(rx.recv())).collect();
            let (msg, idx, _rest) = tokio::select! {
                _ = cancel.cancelled() => break,
                result = select_all(recv_futs) => result,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    let key = p.group_key();
                    let slots = self.groups.entry(key.clone()).or_insert_with(|| GroupSlots::new(n));
                    slots.slots[idx] = Some(p);
                    if slots.aligned_within(self.tolerance_ns) {
                        let merged = self.merge(&key, &slots.slots);
                        if let Some(out) = merged {
                            self.stats.record_processed();
                            if self.output.send(out).await.is_err() {
                                break;
                            }
                        }
                        self.groups.insert(key, GroupSlots::new(n));
                    }
                }
                Some(EdgeMessage::Barrier(w)) => {
                    if self.fill != FillPolicy::None {
                        let keys: Vec<String> = self.groups.keys().cloned().collect();
                        for key in keys {
                            let slots = self.groups.remove(&key).unwrap();
                            if let Some(out) = self.merge(&key, &slots.slots) {
                                self.stats.record_processed();
                                let _ = self.output.send(out).await;
                            }
                        }
                    }
                    let _ = self.output.send_barrier(w).await;
                }
                None => {
                    inputs.remove(idx);
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
