//! `aggregate` node (§4.2): reduces a Batch's points over a named field to
//! a single scalar, emitting a Batch with one row carrying the result.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vortex_shared::edge::{EdgeMessage, EdgeReceiver, EdgeSender};
use vortex_shared::model::{Batch, Point, Value};
use vortex_shared::VortexError;

use crate::kernel::{Node, NodeId, NodeStats};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFn {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Percentile(f64),
    StdDev,
    Spread,
}

impl AggregateFn {
    pub fn parse(name: &str, arg: Option<f64>) -> Result<Self, VortexError> {
        match name {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "count" => Ok(Self::Count),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "stddev" => Ok(Self::StdDev),
            "spread" => Ok(Self::Spread),
            "percentile" => {
                let p = arg.ok_or_else(|| {
                    VortexError::ValidationError("percentile() requires a numeric argument".to_string())
                })?;
                Ok(Self::Percentile(p))
            }
            other => Err(VortexError::ValidationError(format!("unknown aggregate function {other}"))),
        }
    }

    fn reduce(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Count => values.len() as f64,
            Self::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::Spread => {
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                max - min
            }
            Self::StdDev => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                if values.len() < 2 {
                    return 0.0;
                }
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
                variance.sqrt()
            }
            Self::Percentile(p) => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let rank = (p / 100.0) * (sorted.len() - 1) as f64;
                let lower = rank.floor() as usize;
                let upper = rank.ceil() as usize;
                if lower == upper {
                    sorted[lower]
                } else {
                    let frac = rank - lower as f64;
                    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
                }
            }
        }
    }
}

pub struct AggregateNode {
    id: NodeId,
    field: String,
    as_name: String,
    func: AggregateFn,
    input: EdgeReceiver<Batch>,
    output: EdgeSender<Batch>,
    stats: Arc<NodeStats>,
}

impl AggregateNode {
    pub fn new(
        id: NodeId,
        field: String,
        as_name: String,
        func: AggregateFn,
        input: EdgeReceiver<Batch>,
        output: EdgeSender<Batch>,
    ) -> Self {
        Self {
            id,
            field,
            as_name,
            func,
            input,
            output,
            stats: NodeStats::new(),
        }
    }
}

#[async_trait]
impl Node for AggregateNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "aggregate"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(batch)) => {
                    let values: Vec<f64> = batch
                        .points
                        .iter()
                        .filter_map(|p| p.fields.get(&self.field))
                        .filter_map(Value::as_f64)
                        .collect();
                    let result = self.func.reduce(&values);
                    let row = Point::new(batch.measurement.clone(), batch.end)
                        .with_dimensions(batch.dimensions.clone())
                        .with_field(self.as_name.clone(), Value::Float(result));
                    let out = Batch::new(
                        batch.measurement.clone(),
                        batch.group_key.clone(),
                        batch.begin,
                        batch.end,
                        batch.dimensions.clone(),
                    )
                    .with_points(vec![row]);
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
