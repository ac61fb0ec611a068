//! `window` node (§4.2): batches a Point stream into fixed or sliding
//! windows by event time. Windows start on multiples of `every_ns` and
//! span `period_ns`; when `every == period` windows are tumbling (exactly
//! one open per group), and when `every < period` windows are sliding —
//! several windows are concurrently open per group, each point landing in
//! every window whose `[start, start+period)` contains its timestamp.
//! Watermark = max event time seen per group; points older than
//! `watermark - late_tolerance` are dropped and counted rather than
//! folded into an already-closed window.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Batch, Point};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};
use crate::props::Properties;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GroupWindows {
    watermark: i64,
    /// Window start (multiple of `every_ns`) -> points accumulated so far.
    open: BTreeMap<i64, Vec<Point>>,
}

pub struct WindowNode {
    id: NodeId,
    every_ns: i64,
    period_ns: i64,
    late_tolerance_ns: i64,
    groups: HashMap<String, GroupWindows>,
    input: EdgeReceiver<Point>,
    output: EdgeSender<Batch>,
    stats: Arc<NodeStats>,
    live_state: Arc<Mutex<Option<Vec<u8>>>>,
}

impl WindowNode {
    pub fn new(
        id: NodeId,
        every_ns: i64,
        period_ns: i64,
        late_tolerance_ns: i64,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Batch>,
    ) -> Self {
        Self {
            id,
            every_ns,
            period_ns,
            late_tolerance_ns,
            groups: HashMap::new(),
            input,
            output,
            stats: NodeStats::new(),
            live_state: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_properties(
        id: NodeId,
        props: &Properties,
        input: EdgeReceiver<Point>,
        output: EdgeSender<Batch>,
    ) -> Result<Self, VortexError> {
        let every_ns = props.get_f64("every")? as i64;
        let period_ns = props.get_f64_or("period", every_ns as f64) as i64;
        let late_tolerance_ns = props.get_f64_or("late_tolerance", 0.0) as i64;
        Ok(Self::new(id, every_ns, period_ns, late_tolerance_ns, input, output))
    }

    /// Every window start (a multiple of `every_ns`) whose `[start,
    /// start+period_ns)` span contains `ts`, newest first. For the
    /// tumbling case (`every_ns == period_ns`) this is exactly one start.
    fn covering_starts(&self, ts: i64) -> Vec<i64> {
        let mut starts = Vec::new();
        let mut start = ts.div_euclid(self.every_ns) * self.every_ns;
        while start + self.period_ns > ts {
            starts.push(start);
            let next = start - self.every_ns;
            if next + self.period_ns <= ts {
                break;
            }
            start = next;
        }
        starts
    }

    async fn close_window(&mut self, key: &str, start: i64, points: Vec<Point>) -> Result<(), VortexError> {
        if points.is_empty() {
            return Ok(());
        }
        let measurement = points[0].measurement.clone();
        let dims = points[0].dimensions.clone();
        let batch = Batch::new(measurement, key, start, start + self.period_ns, dims).with_points(points);
        self.stats.record_processed();
        let _ = self.output.send(batch).await;
        Ok(())
    }

    /// Close and remove every window in `key`'s group whose end time
    /// (`start + period_ns`) is at or before `threshold`.
    async fn close_through(&mut self, key: &str, threshold: i64) -> Result<(), VortexError> {
        let Some(group) = self.groups.get_mut(key) else {
            return Ok(());
        };
        let ready: Vec<i64> =
            group.open.range(..).filter(|(start, _)| **start + self.period_ns <= threshold).map(|(s, _)| *s).collect();
        for start in ready {
            let points = group.open.remove(&start).unwrap_or_default();
            self.close_window(key, start, points).await?;
        }
        Ok(())
    }

    async fn close_all(&mut self, key: &str) -> Result<(), VortexError> {
        let Some(group) = self.groups.remove(key) else {
            return Ok(());
        };
        for (start, points) in group.open {
            self.close_window(key, start, points).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Node for WindowNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "window"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    let key = p.group_key();
                    let watermark = self.groups.get(&key).map(|g| g.watermark).unwrap_or(i64::MIN);
                    if p.timestamp < watermark - self.late_tolerance_ns {
                        self.stats.record_late();
                        continue;
                    }
                    let starts = self.covering_starts(p.timestamp);
                    let group = self.groups.entry(key).or_default();
                    group.watermark = group.watermark.max(p.timestamp);
                    for start in starts {
                        group.open.entry(start).or_default().push(p.clone());
                    }
                }
                Some(EdgeMessage::Barrier(watermark)) => {
                    let keys: Vec<String> = self.groups.keys().cloned().collect();
                    for key in keys {
                        self.close_through(&key, watermark).await?;
                        if self.groups.get(&key).map(|g| g.open.is_empty()).unwrap_or(false) {
                            self.groups.remove(&key);
                        }
                    }
                    let _ = self.output.send_barrier(watermark).await;
                }
                None => {
                    let keys: Vec<String> = self.groups.keys().cloned().collect();
                    for key in keys {
                        self.close_all(&key).await?;
                    }
                    break;
                }
            }
        }
        *self.live_state.lock().unwrap() = Some(self.snapshot());
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        serde_json::to_vec(&self.groups).unwrap_or_default()
    }

    fn restore(&mut self, bytes: &[u8]) {
        if let Ok(groups) = serde_json::from_slice(bytes) {
            self.groups = groups;
        }
    }

    fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }

    fn live_state(&self) -> Option<Arc<Mutex<Option<Vec<u8>>>>> {
        Some(self.live_state.clone())
    }
}
