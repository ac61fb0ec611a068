//! `group-by` node (§4.2): changes the active dimensions, rekeying every
//! subsequent message.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Dimensions, Point};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};
use crate::props::Properties;

pub struct GroupByNode {
    id: NodeId,
    dimensions: Dimensions,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Point>,
    stats: Arc<NodeStats>,
}

impl GroupByNode {
    pub fn new(
        id: NodeId,
        dimensions: Dimensions,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Self {
        Self {
            id,
            dimensions,
            input,
            output,
            stats: NodeStats::new(),
        }
    }

    pub fn from_properties(
        id: NodeId,
        props: &Properties,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Point>,
    ) -> Result<Self, VortexError> {
        let tag_keys = props.get_str_list("tags")?;
        let by_measurement = props.get_bool_or("by_measurement", false);
        Ok(Self::new(
            id,
            Dimensions::new(tag_keys, by_measurement),
            input,
            output,
        ))
    }
}

#[async_trait]
impl Node for GroupByNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "group-by"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    self.stats.record_processed();
                    let rekeyed = p.rekeyed(self.dimensions.clone());
                    if self.output.send(rekeyed).await.is_err() {
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
    async fn group_by_rekeys_points_by_tag() {
        let (in_tx, in_rx) = edge::<Point>(8);
        let (out_tx, mut out_rx) = edge::<Point>(8);
        let node = Box::new(GroupByNode::new(
            1,
            Dimensions::new(["host".to_string()], false),
            in_rx,
            out_tx,
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        in_tx
            .send(Point::new("cpu", 1).with_tag("host", "a1").with_tag("region", "us"))
            .await
            .unwrap();
        drop(in_tx);

        let mut received = Vec::new();
        while let Some(EdgeMessage::Data(p)) = out_rx.recv().await {
            received.push(p);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(received[0].group_key(), "host=a1");
    }
}
