//! Tool Registry
//!
//! The [`LocalToolRegistry`] holds the tools available to the engine and
//! implements [`ToolRegistryPort`].
//!
//! # Usage
//!
//! ```ignore
//! use conductor_infrastructure::tools::{CommandTool, LocalToolRegistry};
//!
//! let registry = LocalToolRegistry::new().register(Arc::new(CommandTool::new()));
//! assert_eq!(registry.tool_names(), vec!["run_command"]);
//! ```
//!
//! # Resolution
//!
//! A task names either a tool or a capability:
//!
//! 1. A registered tool whose name equals the task's `tool` wins outright
//! 2. Otherwise every tool advertising that capability is returned, in
//!    registration order

use conductor_application::ports::tool_registry::{Tool, ToolRegistryPort};
use conductor_domain::Task;
use std::sync::Arc;
use tracing::{debug, warn};

use super::command::CommandTool;

/// Registry of locally available tools
#[derive(Default)]
pub struct LocalToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools (`run_command`).
    pub fn with_defaults() -> Self {
        Self::new().register(Arc::new(CommandTool::new()))
    }

    /// Add a tool; a tool with the same name replaces the earlier one.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(tool = tool.name(), "Replacing registered tool");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolRegistryPort for LocalToolRegistry {
    fn find_for_task(&self, task: &Task) -> Vec<Arc<dyn Tool>> {
        if let Some(tool) = self.get(&task.tool) {
            return vec![tool];
        }
        let matches: Vec<Arc<dyn Tool>> = self
            .tools
            .iter()
            .filter(|t| t.capabilities().contains(&task.tool.as_str()))
            .cloned()
            .collect();
        debug!(
            task = %task.id,
            wanted = %task.tool,
            matches = matches.len(),
            "Resolved tool by capability"
        );
        matches
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }
}
