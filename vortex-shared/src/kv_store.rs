//! Narrow key-value interface to the external persisted-state backend
//! (§6). The production backend (an external KV store) is out of scope;
//! [`InMemoryKvStore`] is the reference implementation used by tests and
//! the CLI runner.

use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, thiserror::Error)]
pub enum KvStoreError {
    #[error("key not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), KvStoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvStoreError>;
    async fn delete(&self, key: &str) -> Result<(), KvStoreError>;
    /// Keys sharing `prefix`, in unspecified order.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvStoreError>;
}

/// Snapshot key for a task, per §6: `/tasks/{id}/snapshot`.
pub fn task_snapshot_key(task_id: &str) -> String {
    format!("/tasks/{task_id}/snapshot")
}

/// Alert history key, per §6: `/alerts/{topic}/{series}`.
pub fn alert_history_key(topic: &str, series_id: &str) -> String {
    format!("/alerts/{topic}/{series_id}")
}

#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    data: DashMap<String, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), KvStoreError> {
        self.data.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, KvStoreError> {
        self.data
            .get(key)
            .map(|v| v.clone())
            .ok_or_else(|| KvStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), KvStoreError> {
        self.data.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvStoreError> {
        Ok(self
            .data
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}
