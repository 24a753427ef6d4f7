//! Memory port
//!
//! Long-term store of learnings and the decision audit trail. Every call
//! the engine makes through this port is non-fatal: failures are logged
//! and the phase proceeds.

use async_trait::async_trait;
use conductor_domain::{Decision, Learning};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Memory storage error: {0}")]
    Storage(String),

    #[error("Memory serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait MemoryPort: Send + Sync {
    /// Learnings relevant to `pattern` (usually the goal description)
    async fn recall(&self, pattern: &str) -> Result<Vec<Learning>, MemoryError>;

    async fn store(&self, learning: &Learning) -> Result<(), MemoryError>;

    async fn record_decision(&self, decision: &Decision) -> Result<(), MemoryError>;
}
