//! Checkpoint store port
//!
//! Durable storage for [`Checkpoint`] records, keyed by [`CheckpointId`].
//!
//! # Built-in Implementations
//!
//! - [`InMemoryCheckpointStore`] - keeps serialized records in a map; useful
//!   for tests and for runs that only need in-process rollback
//!
//! For file persistence, see `FileCheckpointStore` in the infrastructure layer.

use async_trait::async_trait;
use conductor_domain::{Checkpoint, CheckpointId};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(CheckpointId),

    #[error("Cannot restore while the agent is running")]
    AgentBusy,

    #[error("Checkpointing is not configured")]
    NotConfigured,

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists `checkpoint`, replacing any record with the same id.
    async fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    async fn read(&self, id: &CheckpointId) -> Result<Checkpoint, CheckpointError>;

    /// All readable records, oldest first. Corrupt records are skipped.
    async fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError>;

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError>;
}

/// Checkpoint store holding serialized records in memory.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    records: Mutex<BTreeMap<CheckpointId, String>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The serialized form of a record, as written.
    pub fn raw(&self, id: &CheckpointId) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(checkpoint.id.clone(), json);
        Ok(())
    }

    async fn read(&self, id: &CheckpointId) -> Result<Checkpoint, CheckpointError> {
        let json = self
            .raw(id)
            .ok_or_else(|| CheckpointError::NotFound(id.clone()))?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut checkpoints: Vec<Checkpoint> = records
            .values()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect();
        checkpoints.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(checkpoints)
    }

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CheckpointError::NotFound(id.clone()))
    }
}
