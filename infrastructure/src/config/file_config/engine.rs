//! Engine configuration from TOML (`[engine]` section)

use conductor_application::{DEFAULT_TOOL, ExecutionParams};
use serde::{Deserialize, Serialize};

/// Raw engine configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineConfig {
    /// Maximum loop iterations per run
    pub max_iterations: usize,
    /// Synthesize task results instead of running tools
    pub dry_run: bool,
    /// Tool assigned to fallback tasks
    pub default_tool: String,
    /// Working directory for tools and project analysis
    pub working_dir: Option<String>,
    /// Instance identifier folded into checkpoint ids
    pub instance_id: Option<String>,
    /// Constraints applied to every run, on top of the goal's own
    pub constraints: Vec<String>,
    /// Timeout for `run_command`
    pub command_timeout_secs: u64,
    /// Report `git status` changes made by commands
    pub detect_changes: bool,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        let params = ExecutionParams::default();
        Self {
            max_iterations: params.max_iterations,
            dry_run: params.dry_run,
            default_tool: DEFAULT_TOOL.to_string(),
            working_dir: None,
            instance_id: None,
            constraints: Vec::new(),
            command_timeout_secs: 60,
            detect_changes: true,
        }
    }
}

impl FileEngineConfig {
    /// Loop parameters; checkpoint cadence is filled in from `[checkpoint]`.
    pub fn to_execution_params(&self) -> ExecutionParams {
        let mut params = ExecutionParams::default()
            .with_max_iterations(self.max_iterations)
            .with_dry_run(self.dry_run)
            .with_default_tool(self.default_tool.clone());
        if let Some(dir) = &self.working_dir {
            params = params.with_working_dir(dir.clone());
        }
        if let Some(id) = &self.instance_id {
            params = params.with_instance_id(id.clone());
        }
        params
    }
}
