//! A compiled, runnable graph of nodes (§4.1 "Compilation" / §9).
//!
//! `Compiler::compile` produces one of these per task. Every node is its
//! own worker: `Graph::spawn` hands each a clone of a shared
//! `CancellationToken` and lets tokio schedule them independently, the
//! same pattern every node's own unit tests already use
//! (`tokio::spawn(node.run(cancel.clone()))`).

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats, NodeStatsSnapshot};

pub struct Graph {
    nodes: Vec<Box<dyn Node>>,
}

/// A graph after `spawn`: node handles are moving targets (each `run`
/// consumes its node), so a cloned `NodeStats` handle per node (cheap,
/// `Arc`-backed) is all that's left for live stats once its node has
/// moved into its worker task. `meta` is captured before the move so the
/// node table can still report each row's id/kind once running.
pub struct RunningGraph {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<Result<(), VortexError>>>,
    stats: Vec<Arc<NodeStats>>,
    meta: Vec<(NodeId, &'static str)>,
    /// Per-node cell a worker publishes its final state into just before
    /// exiting, for nodes that opt in (`Node::live_state`); `None` entries
    /// never publish.
    live_state: Vec<Option<Arc<Mutex<Option<Vec<u8>>>>>>,
}

impl Graph {
    pub fn new(nodes: Vec<Box<dyn Node>>) -> Self {
        Self { nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stats(&self) -> Vec<NodeStatsSnapshot> {
        self.nodes.iter().map(|n| n.stats().snapshot()).collect()
    }

    /// One row per node: stable id, kind name, and current stats snapshot.
    /// Used by the CLI's `stats` command to print a compiled graph's node
    /// table without starting any worker.
    pub fn node_table(&self) -> Vec<(NodeId, &'static str, NodeStatsSnapshot)> {
        self.nodes.iter().map(|n| (n.id(), n.kind(), n.stats().snapshot())).collect()
    }

    /// Snapshot every node's internal state (§4.1 "Snapshot / restore").
    /// Only meaningful while the graph is not running.
    pub fn snapshot(&self) -> Vec<(u32, Vec<u8>)> {
        self.nodes.iter().map(|n| (n.id(), n.snapshot())).collect()
    }

    pub fn restore(&mut self, snapshots: &[(u32, Vec<u8>)]) {
        for (id, bytes) in snapshots {
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id() == *id) {
                node.restore(bytes);
            }
        }
    }

    /// Spawn one worker task per node and return a handle that can be
    /// cancelled and drained independently of this `Graph` (which, post
    /// spawn, owns no nodes — they're moved into their worker tasks).
    pub fn spawn(self) -> RunningGraph {
        let cancel = CancellationToken::new();
        let stats = self.nodes.iter().map(|n| n.stats()).collect();
        let meta = self.nodes.iter().map(|n| (n.id(), n.kind())).collect();
        let live_state = self.nodes.iter().map(|n| n.live_state()).collect();
        let handles = self
            .nodes
            .into_iter()
            .map(|node| {
                let cancel = cancel.clone();
                tokio::spawn(node.run(cancel))
            })
            .collect();
        RunningGraph { cancel, handles, stats, meta, live_state }
    }

    /// Run every node to natural completion (inputs closed) without ever
    /// cancelling — used by tests that close the ingest edge and expect
    /// every downstream node to drain and exit on its own.
    pub async fn run_to_completion(self) -> Result<(), VortexError> {
        let running = self.spawn();
        running.join().await
    }
}

impl RunningGraph {
    pub fn stats(&self) -> Vec<NodeStatsSnapshot> {
        self.stats.iter().map(|s| s.snapshot()).collect()
    }

    pub fn node_table(&self) -> Vec<(NodeId, &'static str, NodeStatsSnapshot)> {
        self.meta.iter().zip(self.stats.iter()).map(|(&(id, kind), s)| (id, kind, s.snapshot())).collect()
    }

    /// Signal every node to stop at its next recv/send, wait for them all
    /// to exit, and collect whatever state the opted-in nodes (`alert`,
    /// `window`) published to their `live_state` cell on the way out
    /// (§4.1 "Disable": drains in-flight state before the graph is
    /// considered stopped). The returned pairs feed straight into
    /// `Graph::restore` on the freshly compiled replacement graph, giving
    /// a disable/enable cycle continuity without an explicit snapshot.
    pub async fn stop(self) -> Result<Vec<(NodeId, Vec<u8>)>, VortexError> {
        self.cancel.cancel();
        let meta = self.meta.clone();
        let live_state = self.live_state.clone();
        self.join().await?;
        let mut carried = Vec::new();
        for ((id, _kind), cell) in meta.into_iter().zip(live_state) {
            if let Some(cell) = cell {
                if let Some(bytes) = cell.lock().unwrap().take() {
                    carried.push((id, bytes));
                }
            }
        }
        Ok(carried)
    }

    async fn join(self) -> Result<(), VortexError> {
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(VortexError::StateError(format!("node task panicked: {e}"))),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::sinks::LogOutNode;
    use vortex_shared::edge::edge;
    use vortex_shared::model::Point;

    #[tokio::test]
    async fn empty_graph_runs_to_completion_immediately() {
        let graph = Graph::new(Vec::new());
        graph.run_to_completion().await.unwrap();
    }

    #[tokio::test]
    async fn graph_drains_when_ingest_closes() {
        let (tx, rx) = edge::<Point>(4);
        let node: Box<dyn Node> = Box::new(LogOutNode::new(1, rx));
        let graph = Graph::new(vec![node]);
        tx.send(Point::new("cpu", 0)).await.unwrap();
        drop(tx);
        graph.run_to_completion().await.unwrap();
    }

    #[tokio::test]
    async fn stop_cancels_a_blocked_node() {
        let (_tx, rx) = edge::<Point>(4);
        let node: Box<dyn Node> = Box::new(LogOutNode::new(1, rx));
        let graph = Graph::new(vec![node]);
        let running = graph.spawn();
        running.stop().await.unwrap();
    }
}
