//! Reviewer port
//!
//! The review collaborator judges the changes produced by a cycle.

use async_trait::async_trait;
use conductor_domain::{Change, ReviewResult};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewerError {
    #[error("Reviewer unavailable: {0}")]
    Unavailable(String),

    #[error("Review failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ReviewerPort: Send + Sync {
    async fn review(&self, changes: &[Change]) -> Result<ReviewResult, ReviewerError>;
}
