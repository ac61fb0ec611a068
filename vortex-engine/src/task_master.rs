//! Task Master (§2): registry of running tasks, enable/disable, hot
//! reload. Mutation paths (create/enable/disable/delete) are rare next to
//! the hot processing loops inside each task's own workers, so the
//! registry itself uses a concurrent map rather than a single global lock
//! (§5 "Locking discipline").

use std::sync::Arc;

use dashmap::DashMap;

use vortex_shared::edge::EdgeReceiver;
use vortex_shared::model::Point;
use vortex_shared::VortexError;

use crate::mediator::Mediators;
use crate::program::Dbrp;
use crate::task::{Task, TaskId, TaskStatus};

pub struct TaskMaster {
    tasks: DashMap<TaskId, Task>,
    edge_capacity: usize,
    mediators: Mediators,
}

impl TaskMaster {
    pub fn new(edge_capacity: usize, mediators: Mediators) -> Arc<Self> {
        Arc::new(Self { tasks: DashMap::new(), edge_capacity, mediators })
    }

    /// `POST /tasks` (§6): compile and register, disabled.
    pub fn create(
        &self,
        program_source: &str,
        dbrps: Vec<Dbrp>,
        ingest: EdgeReceiver<Point>,
    ) -> Result<TaskId, VortexError> {
        let task = Task::create(program_source, dbrps, ingest, self.edge_capacity, self.mediators.clone())?;
        let id = task.id();
        self.tasks.insert(id, task);
        Ok(id)
    }

    pub fn enable(&self, id: TaskId) -> Result<(), VortexError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| VortexError::ValidationError(format!("no such task {id}")))?;
        task.enable()
    }

    /// `disable`: drains the running graph and recompiles a fresh stopped
    /// one wired to `ingest`, the caller's new feed for this task (§4.1).
    pub async fn disable(&self, id: TaskId, ingest: EdgeReceiver<Point>) -> Result<(), VortexError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| VortexError::ValidationError(format!("no such task {id}")))?;
        task.disable(ingest, self.edge_capacity, self.mediators.clone()).await
    }

    pub fn snapshot(&self, id: TaskId) -> Result<Vec<u8>, VortexError> {
        let task = self
            .tasks
            .get(&id)
            .ok_or_else(|| VortexError::ValidationError(format!("no such task {id}")))?;
        task.snapshot()
    }

    pub fn restore(&self, id: TaskId, bytes: &[u8]) -> Result<(), VortexError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| VortexError::ValidationError(format!("no such task {id}")))?;
        task.restore(bytes)
    }

    /// `DELETE /tasks/{id}` (§4.1): disable if needed, release resources,
    /// remove from registry. A task already stopped is simply dropped;
    /// one still running must be torn down by the caller first via
    /// `disable` since dropping a running task's `Task` value here would
    /// silently abandon its worker handles.
    pub fn delete(&self, id: TaskId) -> Result<(), VortexError> {
        let removed = self
            .tasks
            .remove(&id)
            .ok_or_else(|| VortexError::ValidationError(format!("no such task {id}")))?;
        if removed.1.status() == TaskStatus::Enabled {
            return Err(VortexError::StateError(format!(
                "task {id} must be disabled before delete"
            )));
        }
        Ok(())
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|t| t.status())
    }

    /// `GET /tasks[?pattern=]` (§6): list every registered task id and
    /// status, optionally filtered by a substring of the program source.
    pub fn list(&self, pattern: Option<&str>) -> Vec<(TaskId, TaskStatus)> {
        self.tasks
            .iter()
            .filter(|entry| pattern.map(|p| entry.program_source().contains(p)).unwrap_or(true))
            .map(|entry| (*entry.key(), entry.value().status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::{FixtureTsdbClient, RecordingWriteClient};
    use crate::nodes::sinks::HttpOutTable;
    use vortex_shared::edge::edge;
    use vortex_shared::resilience::RetryPolicy;
    use vortex_shared::LogicalClock;

    fn test_mediators() -> Mediators {
        Mediators {
            tsdb_client: Arc::new(FixtureTsdbClient::new(Vec::new())),
            influx_client: Arc::new(RecordingWriteClient::new(0)),
            kafka_client: Arc::new(RecordingWriteClient::new(0)),
            topic_bus: crate::alerting::TopicBus::new(),
            inhibitors: crate::alerting::InhibitorRegistry::new(),
            http_table: HttpOutTable::new(),
            clock: Arc::new(LogicalClock::new(0)),
            retry_policy: RetryPolicy::default(),
        }
    }

    #[test]
    fn create_then_delete_round_trips_through_the_registry() {
        let master = TaskMaster::new(8, test_mediators());
        let (_tx, rx) = edge::<Point>(8);
        let id = master.create("stream|from()|logOut()", Vec::new(), rx).unwrap();
        assert_eq!(master.status(id), Some(TaskStatus::Disabled));
        master.delete(id).unwrap();
        assert_eq!(master.status(id), None);
    }

    #[test]
    fn delete_of_an_enabled_task_is_rejected() {
        let master = TaskMaster::new(8, test_mediators());
        let (_tx, rx) = edge::<Point>(8);
        let id = master.create("stream|from()|logOut()", Vec::new(), rx).unwrap();
        master.enable(id).unwrap();
        assert!(master.delete(id).is_err());
    }

    #[test]
    fn list_filters_by_program_source_substring() {
        let master = TaskMaster::new(8, test_mediators());
        let (_tx, rx1) = edge::<Point>(8);
        let (_tx, rx2) = edge::<Point>(8);
        master.create("stream|from().measurement('cpu')|logOut()", Vec::new(), rx1).unwrap();
        master.create("stream|from().measurement('mem')|logOut()", Vec::new(), rx2).unwrap();
        assert_eq!(master.list(Some("cpu")).len(), 1);
        assert_eq!(master.list(None).len(), 2);
    }
}
