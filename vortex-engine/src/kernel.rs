//! Node lifecycle capability set and statistics (§4.2).
//!
//! Every node kind owns its input/output edge ends directly (constructed
//! by the compiler when wiring the graph) since the edge shapes differ
//! per kind (stream vs. batch, single vs. multi-input); the one contract
//! every node shares is `run`/`snapshot`/`restore`/`stats`, captured here
//! as a trait object so the registry (§9) can hold a single
//! `Vec<Box<dyn Node>>` per task.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vortex_shared::VortexError;

pub type NodeId = u32;

/// Monotone counters and point-in-time gauges exposed by every node,
/// harvested by the periodic statistics reporter (§4.1, `stats.rs`).
#[derive(Debug, Default)]
pub struct NodeStats {
    pub points_processed: AtomicU64,
    pub points_dropped: AtomicU64,
    pub eval_errors: AtomicU64,
    pub errors: AtomicU64,
    pub late_points: AtomicU64,
    pub queue_depth: AtomicU64,
    pub working_set: AtomicU64,
}

impl NodeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_processed(&self) {
        self.points_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.points_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eval_error(&self) {
        self.eval_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late(&self) {
        self.late_points.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_working_set(&self, n: usize) {
        self.working_set.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            points_processed: self.points_processed.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            eval_errors: self.eval_errors.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            late_points: self.late_points.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            working_set: self.working_set.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct NodeStatsSnapshot {
    pub points_processed: u64,
    pub points_dropped: u64,
    pub eval_errors: u64,
    pub errors: u64,
    pub late_points: u64,
    pub queue_depth: u64,
    pub working_set: u64,
}

/// The capability set every node implements (§4.2).
///
/// `run` consumes `self` boxed since a node's worker task owns it for the
/// remainder of its life; `snapshot`/`restore` are called only while the
/// node is not running (the graph quiesces at a barrier first, §4.1).
#[async_trait]
pub trait Node: Send {
    fn id(&self) -> NodeId;
    fn kind(&self) -> &'static str;
    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError>;
    fn snapshot(&self) -> Vec<u8>;
    fn restore(&mut self, bytes: &[u8]);
    fn stats(&self) -> Arc<NodeStats>;

    /// A cell a node can publish its final `snapshot()` bytes into right
    /// before its worker returns, cloned out before `run` consumes the
    /// node (same pattern as `stats`) so a disable can carry live state
    /// into the next enable without an explicit snapshot/restore pair
    /// (§4.1 continuity). Nodes with nothing worth carrying across a
    /// disable leave this `None`; the default never publishes.
    fn live_state(&self) -> Option<Arc<Mutex<Option<Vec<u8>>>>> {
        None
    }
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.id()).field("kind", &self.kind()).finish()
    }
}
