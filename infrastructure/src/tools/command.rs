//! Command execution tool: run_command

use super::changes::{self, StatusSnapshot};
use async_trait::async_trait;
use conductor_application::ports::tool_registry::{Tool, ToolError, ToolOutput, ToolParams};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tool name constant
pub const RUN_COMMAND: &str = "run_command";

/// Default timeout for command execution (60 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum output size (1 MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const CAPABILITIES: &[&str] = &["shell", "command", "build", "test"];

/// Runs a task's prompt as a shell command.
///
/// The command comes from the `command` argument when present, otherwise
/// from the task prompt. `timeout_secs` overrides the configured timeout
/// for a single call.
///
/// With change detection on, `git status` is sampled before and after the
/// command and every path whose status moved is reported as a
/// [`Change`](conductor_domain::Change).
#[derive(Debug, Clone)]
pub struct CommandTool {
    timeout: Duration,
    detect_changes: bool,
}

impl Default for CommandTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTool {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            detect_changes: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_change_detection(mut self, enabled: bool) -> Self {
        self.detect_changes = enabled;
        self
    }

    fn resolve_working_dir(params: &ToolParams) -> Result<Option<PathBuf>, ToolError> {
        let Some(dir) = params.args.get("working_dir").or(params.working_dir.as_ref()) else {
            return Ok(None);
        };
        let path = PathBuf::from(dir);
        if !path.exists() {
            return Err(ToolError::InvalidParams(format!(
                "Working directory not found: {}",
                dir
            )));
        }
        if !path.is_dir() {
            return Err(ToolError::InvalidParams(format!(
                "Not a directory: {}",
                dir
            )));
        }
        Ok(Some(path))
    }

    fn resolve_timeout(&self, params: &ToolParams) -> Result<Duration, ToolError> {
        match params.args.get("timeout_secs") {
            None => Ok(self.timeout),
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| ToolError::InvalidParams(format!("Invalid timeout_secs: {}", raw))),
        }
    }

    async fn snapshot(&self, dir: Option<&Path>) -> Option<StatusSnapshot> {
        if !self.detect_changes {
            return None;
        }
        changes::snapshot(dir.unwrap_or(Path::new("."))).await
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

/// Joins stdout and stderr, capped at [`MAX_OUTPUT_SIZE`] bytes.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut combined = String::new();
    combined.push_str(&stdout);
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(&stderr);
    }

    if combined.len() > MAX_OUTPUT_SIZE {
        let mut cut = MAX_OUTPUT_SIZE;
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);
        combined.push_str("\n... (output truncated)");
    }
    combined
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        RUN_COMMAND
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn capabilities(&self) -> &[&str] {
        CAPABILITIES
    }

    async fn execute(
        &self,
        params: ToolParams,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let command = params
            .args
            .get("command")
            .unwrap_or(&params.prompt)
            .trim()
            .to_string();
        if command.is_empty() {
            return Err(ToolError::InvalidParams("command is empty".to_string()));
        }
        let working_dir = Self::resolve_working_dir(&params)?;
        let timeout = self.resolve_timeout(&params)?;

        let before = self.snapshot(working_dir.as_deref()).await;

        let mut cmd = shell_command(&command);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to spawn command: {}", e)))?;

        // Dropping the wait future kills the child
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(task = %params.task_id, "Command cancelled");
                return Err(ToolError::Cancelled);
            }
            result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
                Err(_) => {
                    warn!(task = %params.task_id, command = %command, "Command timed out");
                    return Err(ToolError::Timeout(timeout.as_secs()));
                }
                Ok(Err(e)) => {
                    return Err(ToolError::ExecutionFailed(format!(
                        "Failed to wait for command: {}",
                        e
                    )));
                }
                Ok(Ok(output)) => output,
            },
        };

        let combined = combine_output(&output.stdout, &output.stderr);
        let detected = match (before, self.snapshot(working_dir.as_deref()).await) {
            (Some(before), Some(after)) => changes::diff(&before, &after).await,
            _ => Vec::new(),
        };

        debug!(
            task = %params.task_id,
            exit_code = output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            changes = detected.len(),
            "Command finished"
        );

        if output.status.success() {
            return Ok(ToolOutput::success(combined).with_changes(detected));
        }

        let error = match output.status.code() {
            Some(code) => format!("Command exited with code {}", code),
            None => "Command terminated by signal".to_string(),
        };
        Ok(ToolOutput {
            output: combined,
            ..ToolOutput::failure(error)
        }
        .with_changes(detected))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use conductor_domain::{ChangeKind, Task};
    use tempfile::tempdir;

    fn params(prompt: &str) -> ToolParams {
        ToolParams::for_task(&Task::new("1", "cmd", prompt, RUN_COMMAND))
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let tool = CommandTool::new();
        let output = tool
            .execute(params("echo hello"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.output.trim(), "hello");
        assert!(output.error.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_output() {
        let tool = CommandTool::new();
        let output = tool
            .execute(params("echo oops >&2; exit 3"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.output.trim(), "oops");
        assert_eq!(output.error.as_deref(), Some("Command exited with code 3"));
    }

    #[tokio::test]
    async fn test_stderr_separator() {
        let combined = combine_output(b"out\n", b"err\n");
        assert_eq!(combined, "out\n\n--- stderr ---\nerr\n");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let big = "é".repeat(MAX_OUTPUT_SIZE);
        let combined = combine_output(big.as_bytes(), b"");
        assert!(combined.ends_with("... (output truncated)"));
        assert!(combined.len() <= MAX_OUTPUT_SIZE + 30);
    }

    #[tokio::test]
    async fn test_command_arg_overrides_prompt_and_runs_in_dir() {
        let dir = tempdir().unwrap();
        let tool = CommandTool::new();
        let p = params("ignored")
            .with_working_dir(Some(dir.path().display().to_string()))
            .with_arg("command", "pwd");
        let output = tool.execute(p, &CancellationToken::new()).await.unwrap();
        let reported = std::fs::canonicalize(output.output.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let tool = CommandTool::new();
        let token = CancellationToken::new();

        let blank = tool.execute(params("   "), &token).await;
        assert!(matches!(blank, Err(ToolError::InvalidParams(_))));

        let missing_dir = params("true").with_working_dir(Some("/definitely/not/here".into()));
        let result = tool.execute(missing_dir, &token).await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));

        let bad_timeout = params("true").with_arg("timeout_secs", "soon");
        let result = tool.execute(bad_timeout, &token).await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let tool = CommandTool::new().with_timeout(Duration::from_millis(100));
        let result = tool
            .execute(params("sleep 5"), &CancellationToken::new())
            .await;
        assert_eq!(result, Err(ToolError::Timeout(0)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_command() {
        let tool = CommandTool::new();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = tool.execute(params("sleep 5"), &token).await;
        assert_eq!(result, Err(ToolError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_change_detection_in_git_repo() {
        let dir = tempdir().unwrap();
        let init = std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status();
        if !init.is_ok_and(|s| s.success()) {
            // git not installed
            return;
        }

        let tool = CommandTool::new().with_change_detection(true);
        let p = params("printf 'a\\nb\\n' > notes.txt")
            .with_working_dir(Some(dir.path().display().to_string()));
        let output = tool.execute(p, &CancellationToken::new()).await.unwrap();

        assert!(output.success);
        assert_eq!(output.changes.len(), 1);
        assert_eq!(output.changes[0].path, "notes.txt");
        assert_eq!(output.changes[0].kind, ChangeKind::Create);
        assert_eq!(output.changes[0].lines_added, 2);
    }
}
