//! Tool registry port
//!
//! Defines how the engine finds and runs the tool for a task (code edits,
//! commands, delegate services). Implementations (adapters) live in the
//! infrastructure layer.

use async_trait::async_trait;
use conductor_domain::{Change, Task, TaskId};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a tool can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timeout after {0}s")]
    Timeout(u64),

    #[error("Tool cancelled")]
    Cancelled,
}

/// Input handed to a tool for one task
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParams {
    pub task_id: TaskId,
    pub prompt: String,
    pub working_dir: Option<String>,
    /// Free-form extra arguments
    pub args: BTreeMap<String, String>,
}

impl ToolParams {
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            prompt: task.prompt.clone(),
            working_dir: None,
            args: BTreeMap::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<String>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// What a tool produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    pub changes: Vec<Change>,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            changes: Vec::new(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            changes: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }
}

/// A tool that can carry out a task
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Capability tags used when a task names a capability rather than a tool
    fn capabilities(&self) -> &[&str] {
        &[]
    }

    async fn execute(
        &self,
        params: ToolParams,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError>;
}

/// Port for tool lookup
pub trait ToolRegistryPort: Send + Sync {
    /// Tools able to run `task`: the task's declared tool first when
    /// registered, otherwise every tool whose capabilities match. The engine
    /// uses the first entry.
    fn find_for_task(&self, task: &Task) -> Vec<Arc<dyn Tool>>;

    /// Names of all registered tools
    fn tool_names(&self) -> Vec<String>;
}
