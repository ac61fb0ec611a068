//! `union` node (§4.2): multi-input, emits all inputs in arrival order,
//! preserving per-edge ordering. No attempt is made to interleave
//! deterministically across edges — "arrival order" means whichever input
//! is ready first, matching `tokio::select!`'s fairness.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::select_all;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::Point;
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};

pub struct UnionNode {
    id: NodeId,
    inputs: Vec<EdgeReceiver<Point>>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl UnionNode {
    pub fn new(id: NodeId, inputs: Vec<EdgeReceiver<Point>>, output: EdgeSender<Point>) -> Self {
        Self {
            id,
            inputs,
            output,
            stats: NodeStats::new(),
        }
    }
}

#[async_trait]
impl Node for UnionNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "union"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        let mut inputs: Vec<EdgeReceiver<Point>> = self.inputs.drain(..).collect();
        while !inputs.is_empty() {
            let recv_futs: Vec<_> = inputs
                .iter_mut()
                .map(|rx| Box::pin(rx.recv()))
                .collect();
            let (msg, idx, _rest) = tokio::select! {
                _ = cancel.cancelled() => break,
                result = select_all(recv_futs) => result,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    self.stats.record_processed();
                    if self.output.send(p).await.is_err() {
                        break;
                    }
                }
                Some(EdgeMessage::Barrier(w)) => {
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
