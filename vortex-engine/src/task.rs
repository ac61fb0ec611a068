//! `Task`: immutable compiled graph plus mutable lifecycle state (§3, §4.1).
//!
//! A `Task` is created once from a parsed program and never recompiled in
//! place — a program edit creates a new compiled `Graph` and replaces the
//! old one, the same "swap, don't mutate" discipline the alert topic bus
//! (`alerting::topic`) uses for its subscriber table.

use uuid::Uuid;

use vortex_shared::edge::EdgeReceiver;
use vortex_shared::model::Point;
use vortex_shared::VortexError;

use crate::compiler::Compiler;
use crate::graph::{Graph, RunningGraph};
use crate::kernel::NodeStatsSnapshot;
use crate::mediator::Mediators;
use crate::program::{parse_program, Dbrp, Program};

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Compiled but not yet started.
    Disabled,
    /// Workers running.
    Enabled,
}

enum GraphState {
    Stopped(Graph),
    Running(RunningGraph),
    /// Transient state while a graph is being stopped to collect its
    /// snapshot; never observed outside `Task::disable`/`snapshot`.
    Empty,
}

/// A single compiled program bound to a stable ID and a set of DBRP scopes
/// restricting which ingested points it may consume.
pub struct Task {
    id: TaskId,
    program_source: String,
    program: Program,
    dbrps: Vec<Dbrp>,
    status: TaskStatus,
    graph: GraphState,
    fatal_error: Option<String>,
}

impl Task {
    /// `create(program, scope)`: parse and type-check, build the graph,
    /// do not start workers (§4.1).
    pub fn create(
        program_source: &str,
        dbrps: Vec<Dbrp>,
        ingest: EdgeReceiver<Point>,
        edge_capacity: usize,
        mediators: Mediators,
    ) -> Result<Self, VortexError> {
        let program = parse_program(program_source).map_err(|e| VortexError::ValidationError(e.to_string()))?;
        let compiler = Compiler::new(edge_capacity, mediators);
        let graph = compiler.compile(&program, ingest)?;
        Ok(Self {
            id: Uuid::new_v4(),
            program_source: program_source.to_string(),
            program,
            dbrps,
            status: TaskStatus::Disabled,
            graph: GraphState::Stopped(graph),
            fatal_error: None,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn dbrps(&self) -> &[Dbrp] {
        &self.dbrps
    }

    pub fn program_source(&self) -> &str {
        &self.program_source
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal_error.as_deref()
    }

    /// `enable(task_id)`: start one worker per node (§4.1).
    pub fn enable(&mut self) -> Result<(), VortexError> {
        match std::mem::replace(&mut self.graph, GraphState::Empty) {
            GraphState::Stopped(graph) => {
                self.graph = GraphState::Running(graph.spawn());
                self.status = TaskStatus::Enabled;
                Ok(())
            }
            other @ GraphState::Running(_) => {
                self.graph = other;
                Err(VortexError::StateError(format!("task {} already enabled", self.id)))
            }
            GraphState::Empty => unreachable!("graph state left empty across an await point"),
        }
    }

    /// `disable(task_id)`: signal cancellation, wait for every worker to
    /// drain, and rebuild a stopped `Graph` so a subsequent `enable` can
    /// restart it (§4.1). A consumed node can't be resurrected after `run`,
    /// so disable recompiles a fresh graph from the same program; nodes
    /// that carry meaningful state (`alert`, `window`) publish it to their
    /// `live_state` cell before exiting, and that state is restored into
    /// the fresh graph automatically, so enable resumes where disable left
    /// off. `snapshot`/`restore` remain the explicit, serialized path for
    /// carrying state across a process restart rather than an in-process
    /// disable/enable cycle.
    pub async fn disable(
        &mut self,
        ingest: EdgeReceiver<Point>,
        edge_capacity: usize,
        mediators: Mediators,
    ) -> Result<(), VortexError> {
        match std::mem::replace(&mut self.graph, GraphState::Empty) {
            GraphState::Running(running) => {
                let live_state = running.stop().await?;
                let compiler = Compiler::new(edge_capacity, mediators);
                let mut graph = compiler.compile(&self.program, ingest)?;
                if !live_state.is_empty() {
                    graph.restore(&live_state);
                }
                self.graph = GraphState::Stopped(graph);
                self.status = TaskStatus::Disabled;
                Ok(())
            }
            GraphState::Stopped(graph) => {
                self.graph = GraphState::Stopped(graph);
                Ok(())
            }
            GraphState::Empty => unreachable!("graph state left empty across an await point"),
        }
    }

    /// `snapshot(task_id) → bytes`: collect per-node serializable state
    /// (§4.2, §4.4), only meaningful while stopped (disable quiesces at a
    /// barrier first).
    pub fn snapshot(&self) -> Result<Vec<u8>, VortexError> {
        match &self.graph {
            GraphState::Stopped(graph) => {
                let pairs = graph.snapshot();
                serde_json::to_vec(&pairs).map_err(|e| VortexError::StateError(e.to_string()))
            }
            GraphState::Running(_) => {
                Err(VortexError::StateError("cannot snapshot a running task; disable first".to_string()))
            }
            GraphState::Empty => unreachable!("graph state left empty across an await point"),
        }
    }

    /// `restore(task_id, bytes) → ()`: load snapshot into the node
    /// instances before enable.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), VortexError> {
        let pairs: Vec<(u32, Vec<u8>)> =
            serde_json::from_slice(bytes).map_err(|e| VortexError::StateError(e.to_string()))?;
        match &mut self.graph {
            GraphState::Stopped(graph) => {
                graph.restore(&pairs);
                Ok(())
            }
            GraphState::Running(_) => {
                Err(VortexError::StateError("cannot restore into a running task; disable first".to_string()))
            }
            GraphState::Empty => unreachable!("graph state left empty across an await point"),
        }
    }

    pub fn stats(&self) -> Vec<NodeStatsSnapshot> {
        match &self.graph {
            GraphState::Stopped(graph) => graph.stats(),
            GraphState::Running(running) => running.stats(),
            GraphState::Empty => Vec::new(),
        }
    }

    /// One row per node: stable id, kind name, and current stats snapshot.
    pub fn node_table(&self) -> Vec<(crate::kernel::NodeId, &'static str, NodeStatsSnapshot)> {
        match &self.graph {
            GraphState::Stopped(graph) => graph.node_table(),
            GraphState::Running(running) => running.node_table(),
            GraphState::Empty => Vec::new(),
        }
    }

    pub fn record_fatal_error(&mut self, message: String) {
        self.fatal_error = Some(message);
        self.status = TaskStatus::Disabled;
    }
}
