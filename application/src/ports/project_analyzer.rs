//! Project analyzer port
//!
//! Gathers structural context about the project a goal targets. Failure is
//! non-fatal to perception.

use async_trait::async_trait;
use conductor_domain::ProjectContext;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Project path not found: {0}")]
    NotFound(String),

    #[error("Analysis failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ProjectAnalyzerPort: Send + Sync {
    async fn analyze(&self, path: &Path) -> Result<ProjectContext, AnalyzerError>;
}
