//! Fan-out duplicator (§9): the compiler's answer to "a variable
//! referenced by more than one downstream pipeline" (`var x = stream|from();
//! x|alert(); x|log()`). One input, N outputs, each its own bounded edge;
//! sends to every consumer run concurrently so a slow consumer applies
//! backpressure only to its own buffer, never stalling its siblings.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};

pub struct FanoutNode<T> {
    id: NodeId,
    input: EdgeReceiver<T>,
    outputs: Vec<EdgeSender<T>>,
    stats: Arc<NodeStats>,
}

impl<T> FanoutNode<T> {
    pub fn new(id: NodeId, input: EdgeReceiver<T>, outputs: Vec<EdgeSender<T>>) -> Self {
        Self {
            id,
            input,
            outputs,
            stats: NodeStats::new(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Node for FanoutNode<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "fanout"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(value)) => {
                    self.stats.record_processed();
                    let sends = self.outputs.iter().map(|out| out.send(value.clone()));
                    join_all(sends).await;
                }
                Some(EdgeMessage::Barrier(w)) => {
                    let barriers = self.outputs.iter().map(|out| out.send_barrier(w));
                    join_all(barriers).await;
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
    async fn duplicates_to_every_consumer() {
        let (in_tx, in_rx) = edge::<i32>(8);
        let (a_tx, mut a_rx) = edge::<i32>(8);
        let (b_tx, mut b_rx) = edge::<i32>(8);
        let node = Box::new(FanoutNode::new(1, in_rx, vec![a_tx, b_tx]));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx.send(7).await.unwrap();
        drop(in_tx);

        assert!(matches!(a_rx.recv().await, Some(EdgeMessage::Data(7))));
        assert!(matches!(b_rx.recv().await, Some(EdgeMessage::Data(7))));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn a_full_consumer_buffer_does_not_starve_a_faster_sibling() {
        let (in_tx, in_rx) = edge::<i32>(8);
        let (slow_tx, slow_rx) = edge::<i32>(1);
        let (fast_tx, mut fast_rx) = edge::<i32>(8);
        let node = Box::new(FanoutNode::new(1, in_rx, vec![slow_tx, fast_tx]));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx.send(1).await.unwrap();
        in_tx.send(2).await.unwrap();

        // The fast consumer sees both values even though the slow one's
        // single-capacity buffer has not drained the first yet.
        assert!(matches!(fast_rx.recv().await, Some(EdgeMessage::Data(1))));
        assert!(matches!(fast_rx.recv().await, Some(EdgeMessage::Data(2))));

        drop(in_tx);
        drop(slow_rx);
        handle.await.unwrap().unwrap();
    }
}
