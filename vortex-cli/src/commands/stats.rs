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
pub struct StatsArgs {
    /// Path to a pipeline program file.
    #[arg(long)]
    pub program: PathBuf,
}

pub async fn handle(args: StatsArgs) -> anyhow::Result<()> {
    let program_source = std::fs::read_to_string(&args.program)?;
    let config = EngineConfig::default();
    let (_ingest_tx, ingest_rx) = edge::<Point>(config.edges.default_capacity);

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

    let task = Task::create(
        &program_source,
        Vec::new(),
        ingest_rx,
        config.edges.default_capacity,
        mediators,
    )?;

    println!("{:<6} {:<14} {:>10} {:>10} {:>8} {:>8}", "id", "kind", "processed", "dropped", "errors", "eval_err");
    for (id, kind, snapshot) in task.node_table() {
        println!(
            "{:<6} {:<14} {:>10} {:>10} {:>8} {:>8}",
            id, kind, snapshot.points_processed, snapshot.points_dropped, snapshot.errors, snapshot.eval_errors
        );
    }
    Ok(())
}
