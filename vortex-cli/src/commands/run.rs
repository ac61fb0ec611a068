use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use vortex_engine::mediator::{FixtureTsdbClient, RecordingWriteClient};
use vortex_engine::nodes::sinks::HttpOutTable;
use vortex_engine::{Mediators, Task};
use vortex_shared::config::EngineConfig;
use vortex_shared::edge::edge;
use vortex_shared::model::Point;
use vortex_shared::SystemClock;

#[derive(Args)]
pub struct RunArgs {
    /// Path to a pipeline program file.
    #[arg(long)]
    pub program: PathBuf,
    /// Path to a newline-delimited JSON file of points to replay; if
    /// omitted the task is compiled and immediately drained empty.
    #[arg(long)]
    pub points: Option<PathBuf>,
}

pub async fn handle(args: RunArgs) -> anyhow::Result<()> {
    let program_source = std::fs::read_to_string(&args.program)?;
    let config = EngineConfig::default();
    let (ingest_tx, ingest_rx) = edge::<Point>(config.edges.default_capacity);

    let mediators = Mediators {
        tsdb_client: Arc::new(FixtureTsdbClient::new(Vec::new())),
        influx_client: Arc::new(RecordingWriteClient::new(0)),
        kafka_client: Arc::new(RecordingWriteClient::new(0)),
        topic_bus: vortex_engine::alerting::TopicBus::new(),
        inhibitors: vortex_engine::alerting::InhibitorRegistry::new(),
        http_table: HttpOutTable::new(),
        clock: Arc::new(SystemClock),
        retry_policy: config.backoff.clone().into(),
    };

    let mut task = Task::create(
        &program_source,
        Vec::new(),
        ingest_rx,
        config.edges.default_capacity,
        mediators,
    )?;
    task.enable()?;

    if let Some(points_path) = args.points {
        let contents = std::fs::read_to_string(points_path)?;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let point: Point = serde_json::from_str(line)?;
            ingest_tx.send(point).await.map_err(|_| anyhow::anyhow!("task ingest edge closed"))?;
        }
    }
    drop(ingest_tx);

    for snapshot in task.stats() {
        tracing::info!(?snapshot, "node stats");
    }
    Ok(())
}
