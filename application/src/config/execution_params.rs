//! Execution parameters - engine loop control.
//!
//! [`ExecutionParams`] groups the static parameters that control the
//! execution loop in [`AgentEngine`](crate::use_cases::run_agent::AgentEngine).
//! These are application-layer concerns, not domain policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tool assigned to fallback tasks when no planner is available
pub const DEFAULT_TOOL: &str = "run_command";

/// Execution loop control parameters.
///
/// Controls the iteration cap, dry-run mode, fallback tool and checkpoint
/// cadence of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Maximum number of loop iterations (one phase handler per iteration).
    pub max_iterations: usize,
    /// Synthesize successful task results instead of calling tools.
    pub dry_run: bool,
    /// Tool name given to the single-task fallback plan.
    pub default_tool: String,
    /// Working directory handed to tools and to the project analyzer.
    pub working_dir: Option<String>,
    /// Save a checkpoint every N iterations (0 disables).
    pub checkpoint_every: usize,
    /// Background auto-save interval while a run is in progress.
    pub auto_save_interval: Option<Duration>,
    /// Instance identifier folded into checkpoint ids.
    pub instance_id: Option<String>,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            dry_run: false,
            default_tool: DEFAULT_TOOL.to_string(),
            working_dir: None,
            checkpoint_every: 0,
            auto_save_interval: None,
            instance_id: None,
        }
    }
}

impl ExecutionParams {
    /// Rejects values the loop cannot honour.
    ///
    /// A cap of zero would fail every run before cancellation is even
    /// observed, so it is refused here instead.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be greater than 0".to_string());
        }
        if self.default_tool.trim().is_empty() {
            return Err("default_tool must not be empty".to_string());
        }
        if self.auto_save_interval.is_some_and(|i| i.is_zero()) {
            return Err("auto_save_interval must be greater than 0".to_string());
        }
        Ok(())
    }

    // ==================== Builder Methods ====================

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_default_tool(mut self, tool: impl Into<String>) -> Self {
        self.default_tool = tool.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn with_auto_save_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_save_interval = interval;
        self
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ExecutionParams::default();
        assert_eq!(params.max_iterations, 50);
        assert!(!params.dry_run);
        assert_eq!(params.default_tool, DEFAULT_TOOL);
        assert_eq!(params.checkpoint_every, 0);
        assert!(params.auto_save_interval.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let params = ExecutionParams::default()
            .with_max_iterations(10)
            .with_dry_run(true)
            .with_working_dir("/tmp/test")
            .with_instance_id("worker-1");

        assert_eq!(params.max_iterations, 10);
        assert!(params.dry_run);
        assert_eq!(params.working_dir, Some("/tmp/test".to_string()));
        assert_eq!(params.instance_id.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let params = ExecutionParams::default().with_max_iterations(0);
        assert!(params.validate().unwrap_err().contains("max_iterations"));
    }

    #[test]
    fn test_validate_rejects_blank_tool_and_zero_interval() {
        assert!(ExecutionParams::default().with_default_tool(" ").validate().is_err());
        assert!(
            ExecutionParams::default()
                .with_auto_save_interval(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }
}
