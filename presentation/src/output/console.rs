//! Console output formatter for run results and checkpoints

use colored::Colorize;
use conductor_application::ExecutionResult;
use conductor_domain::{AgentState, Checkpoint};
use serde_json::Value;
use std::collections::BTreeMap;

/// Formats engine output for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format a complete run result
    pub fn format(result: &ExecutionResult) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Conductor Run"));
        output.push('\n');

        if let Some(goal) = &result.goal {
            output.push_str(&format!(
                "{} {} ({})\n",
                "Goal:".cyan().bold(),
                goal.description,
                goal.priority.as_str()
            ));
        }
        output.push_str(&format!(
            "{} {}\n",
            "State:".cyan().bold(),
            Self::state_label(result.state)
        ));
        output.push_str(&format!(
            "{} {}/{} complete, {} failed | {} iterations | {:.1}s\n",
            "Tasks:".cyan().bold(),
            result.tasks_completed,
            result.tasks_total,
            result.tasks_failed,
            result.iterations,
            result.duration().as_secs_f64()
        ));

        if !result.results.is_empty() {
            output.push_str(&Self::section_header("Task Results"));
            for task in &result.results {
                let mark = if task.success {
                    "✓".green()
                } else {
                    "✗".red()
                };
                output.push_str(&format!(
                    "  {} {} {} {}\n",
                    mark,
                    task.task_id.as_str().bold(),
                    task.tool.dimmed(),
                    format!("{}ms", task.duration_ms).dimmed()
                ));
                if let Some(error) = &task.error {
                    output.push_str(&format!("      {}\n", error.red()));
                }
                for change in &task.changes {
                    output.push_str(&format!(
                        "      {} {} (+{} -{})\n",
                        change.kind.as_str(),
                        change.path,
                        change.lines_added,
                        change.lines_removed
                    ));
                }
                for violation in &task.violations {
                    output.push_str(&format!("      {} {}\n", "⚠".yellow(), violation));
                }
            }
        }

        if !result.learnings.is_empty() {
            output.push_str(&Self::section_header("Learnings"));
            for learning in &result.learnings {
                output.push_str(&format!(
                    "  * {} {}\n",
                    learning.lesson,
                    format!("(confidence {:.2})", learning.confidence).dimmed()
                ));
            }
        }

        output.push_str(&format!("\n{} {}\n", "Summary:".bold(), result.summary));
        if let Some(error) = &result.error {
            output.push_str(&format!("{} {}\n", "Error:".red().bold(), error));
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(result: &ExecutionResult) -> String {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
    }

    /// One line per checkpoint, oldest first
    pub fn format_checkpoints(checkpoints: &[Checkpoint]) -> String {
        if checkpoints.is_empty() {
            return format!("{}\n", "No checkpoints saved".dimmed());
        }
        let mut output = String::new();
        for checkpoint in checkpoints {
            let (settled, total) = checkpoint.plan.progress();
            let goal = checkpoint
                .goal
                .as_ref()
                .map(|g| g.description.as_str())
                .unwrap_or("-");
            output.push_str(&format!(
                "{}  {}  {:<10} {}/{} tasks  {}\n",
                checkpoint.id.as_str().bold(),
                checkpoint
                    .timestamp
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed(),
                checkpoint.state.as_str(),
                settled,
                total,
                goal
            ));
        }
        output
    }

    /// Telemetry summary as aligned key/value lines
    pub fn format_telemetry(summary: &BTreeMap<String, Value>) -> String {
        let width = summary.keys().map(String::len).max().unwrap_or(0);
        let mut output = Self::section_header("Telemetry");
        for (key, value) in summary {
            output.push_str(&format!("  {:<width$}  {}\n", key, value, width = width));
        }
        output
    }

    fn state_label(state: AgentState) -> String {
        match state {
            AgentState::Complete => state.display_name().green().bold().to_string(),
            AgentState::Failed => state.display_name().red().bold().to_string(),
            _ => state.display_name().yellow().to_string(),
        }
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conductor_domain::{CheckpointId, Goal, Learning, Plan, Task, TaskResult};
    use serde_json::json;

    fn result() -> ExecutionResult {
        ExecutionResult {
            success: false,
            state: AgentState::Failed,
            goal: Some(Goal::new("fix bug")),
            summary: "1/2 tasks complete".to_string(),
            duration_ms: 1500,
            iterations: 7,
            tasks_total: 2,
            tasks_completed: 1,
            tasks_failed: 1,
            results: vec![
                TaskResult::success("1", "run_command", 12),
                TaskResult::failure("2", "run_command", 30, "exit 1"),
            ],
            decisions: Vec::new(),
            learnings: vec![Learning::new("fix bug", "1 of 2 tasks failed", 0.5)],
            error: Some("Max iterations (7) exceeded".to_string()),
        }
    }

    #[test]
    fn test_format_text() {
        colored::control::set_override(false);
        let text = ConsoleFormatter::format(&result());

        assert!(text.contains("Goal: fix bug (medium)"));
        assert!(text.contains("State: Failed"));
        assert!(text.contains("Tasks: 1/2 complete, 1 failed | 7 iterations | 1.5s"));
        assert!(text.contains("✗ 2 run_command 30ms"));
        assert!(text.contains("exit 1"));
        assert!(text.contains("1 of 2 tasks failed"));
        assert!(text.contains("Error: Max iterations (7) exceeded"));
    }

    #[test]
    fn test_format_json() {
        let value: Value = serde_json::from_str(&ConsoleFormatter::format_json(&result())).unwrap();
        assert_eq!(value["state"], json!("failed"));
        assert_eq!(value["tasks_failed"], json!(1));
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_format_checkpoints() {
        colored::control::set_override(false);
        assert!(ConsoleFormatter::format_checkpoints(&[]).contains("No checkpoints"));

        let now = Utc::now();
        let checkpoint = Checkpoint {
            id: CheckpointId::generate(now, 0, None),
            timestamp: now,
            state: AgentState::Executing,
            goal: Some(Goal::new("deploy")),
            plan: Plan::new(vec![Task::new("1", "a", "p", "run_command")]),
            decisions: Vec::new(),
            completed: Vec::new(),
            iteration: 2,
            metadata: Default::default(),
        };
        let listed = ConsoleFormatter::format_checkpoints(std::slice::from_ref(&checkpoint));
        assert!(listed.starts_with(checkpoint.id.as_str()));
        assert!(listed.contains("executing"));
        assert!(listed.contains("0/1 tasks  deploy"));
    }

    #[test]
    fn test_format_telemetry() {
        colored::control::set_override(false);
        let mut summary = BTreeMap::new();
        summary.insert("tasks_total".to_string(), json!(3));
        summary.insert("task_success_rate".to_string(), json!(0.5));
        let text = ConsoleFormatter::format_telemetry(&summary);
        assert!(text.contains("task_success_rate  0.5"));
        assert!(text.contains("tasks_total        3"));
    }
}
