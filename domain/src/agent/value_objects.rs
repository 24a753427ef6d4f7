//! Agent domain value objects - immutable types produced during a run.
//!
//! # Identifiers
//! - [`TaskId`] - Unique identifier for a task within a plan
//!
//! # Execution Data
//! - [`TaskResult`] - Outcome of one task (settled once, never mutated)
//! - [`Change`] - A single file change proposed by a tool
//! - [`ReviewResult`] - Verdict returned by the review collaborator
//! - [`ProjectContext`] - What the project analyzer learned about the workspace
//!
//! # Audit & Learning
//! - [`Decision`] - Append-only audit record of a phase transition
//! - [`Learning`] - Lesson distilled by the reflect phase
//! - [`Progress`] - Point-in-time progress view for operators

use super::entities::AgentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a task within a plan.
///
/// Planner-generated plans usually number tasks sequentially ("1", "2", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T: Into<String>> From<T> for TaskId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A single change proposed by a tool (usually one file of a diff)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Path of the affected file, relative to the project root
    pub path: String,
    pub kind: ChangeKind,
    /// Unified diff or full new content
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub lines_added: usize,
    #[serde(default)]
    pub lines_removed: usize,
}

impl Change {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            diff: String::new(),
            lines_added: 0,
            lines_removed: 0,
        }
    }

    /// Attach a diff and derive the added/removed line counts from it.
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        let diff = diff.into();
        self.lines_added = diff
            .lines()
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .count();
        self.lines_removed = diff
            .lines()
            .filter(|l| l.starts_with('-') && !l.starts_with("---"))
            .count();
        self.diff = diff;
        self
    }

    pub fn total_lines(&self) -> usize {
        self.lines_added + self.lines_removed
    }
}

/// Verdict of the review collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    Reject,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &str {
        match self {
            ReviewVerdict::Approve => "approve",
            ReviewVerdict::RequestChanges => "request_changes",
            ReviewVerdict::Reject => "reject",
        }
    }
}

/// Result of reviewing a set of changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub verdict: ReviewVerdict,
    /// Reviewer score, conventionally 0-100
    pub score: f64,
    #[serde(default)]
    pub comments: Vec<String>,
}

impl ReviewResult {
    pub fn new(verdict: ReviewVerdict, score: f64) -> Self {
        Self {
            verdict,
            score,
            comments: Vec::new(),
        }
    }

    pub fn approve(score: f64) -> Self {
        Self::new(ReviewVerdict::Approve, score)
    }

    pub fn reject(score: f64) -> Self {
        Self::new(ReviewVerdict::Reject, score)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }
}

/// Outcome of one task.
///
/// Created once per task execution and attached to the task; a re-run of
/// the task produces a fresh `TaskResult` rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    /// Name of the tool that executed the task
    pub tool: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewResult>,
    /// Advisory constraint violations found in `changes`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl TaskResult {
    pub fn success(task_id: impl Into<TaskId>, tool: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            tool: tool.into(),
            duration_ms,
            changes: Vec::new(),
            error: None,
            review: None,
            violations: Vec::new(),
        }
    }

    pub fn failure(
        task_id: impl Into<TaskId>,
        tool: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            tool: tool.into(),
            duration_ms,
            changes: Vec::new(),
            error: Some(error.into()),
            review: None,
            violations: Vec::new(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_review(mut self, review: ReviewResult) -> Self {
        self.review = Some(review);
        self
    }
}

/// Category of a recorded decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Perceive,
    Plan,
    SelectTool,
    Advance,
    Approve,
    Reject,
    RequestChanges,
    Reflect,
    Complete,
    Fail,
}

impl DecisionType {
    pub fn as_str(&self) -> &str {
        match self {
            DecisionType::Perceive => "perceive",
            DecisionType::Plan => "plan",
            DecisionType::SelectTool => "select_tool",
            DecisionType::Advance => "advance",
            DecisionType::Approve => "approve",
            DecisionType::Reject => "reject",
            DecisionType::RequestChanges => "request_changes",
            DecisionType::Reflect => "reflect",
            DecisionType::Complete => "complete",
            DecisionType::Fail => "fail",
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record of one phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    /// State the agent was in when the decision was taken
    pub state: AgentState,
    pub decision_type: DecisionType,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Always within `[0, 1]`
    pub confidence: f64,
}

impl Decision {
    /// Creates a decision stamped with the current time.
    ///
    /// Confidence is clamped to `[0, 1]`; NaN becomes 0.
    pub fn new(
        state: AgentState,
        decision_type: DecisionType,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            timestamp: Utc::now(),
            state,
            decision_type,
            reasoning: reasoning.into(),
            action: None,
            confidence,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// Lesson distilled from one execution, handed to the memory collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    /// Pattern the lesson applies to (usually the goal description)
    pub pattern: String,
    pub lesson: String,
    pub confidence: f64,
    /// Fraction of tasks that succeeded, `0.0..=1.0`
    pub success_rate: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Learning {
    pub fn new(pattern: impl Into<String>, lesson: impl Into<String>, confidence: f64) -> Self {
        Self {
            pattern: pattern.into(),
            lesson: lesson.into(),
            confidence: confidence.clamp(0.0, 1.0),
            success_rate: 0.0,
            tags: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Context gathered about the project by the analyzer collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub root: Option<String>,
    /// Detected project type (e.g., "rust", "python", "node")
    pub project_type: Option<String>,
    pub key_files: Vec<String>,
    pub summary: Option<String>,
    pub additional: BTreeMap<String, String>,
}

impl ProjectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_project_type(mut self, project_type: impl Into<String>) -> Self {
        self.project_type = Some(project_type.into());
        self
    }

    pub fn add_key_file(&mut self, file: impl Into<String>) {
        self.key_files.push(file.into());
    }

    /// Formats the context as plain text for planner prompts.
    pub fn to_prompt_context(&self) -> String {
        let mut parts = Vec::new();
        if let Some(root) = &self.root {
            parts.push(format!("Project Root: {}", root));
        }
        if let Some(project_type) = &self.project_type {
            parts.push(format!("Project Type: {}", project_type));
        }
        if !self.key_files.is_empty() {
            parts.push(format!("Key Files:\n- {}", self.key_files.join("\n- ")));
        }
        if let Some(summary) = &self.summary {
            parts.push(format!("Summary:\n{}", summary));
        }
        for (key, value) in &self.additional {
            parts.push(format!("{}: {}", key, value));
        }
        parts.join("\n\n")
    }
}

/// Point-in-time progress view of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub state: AgentState,
    /// Name of the task currently in progress, if any
    pub current_task: Option<String>,
    pub completed: usize,
    pub total: usize,
    /// `completed / total * 100`, or 0 when there is no plan yet
    pub percentage: f64,
}

impl Progress {
    pub fn new(
        state: AgentState,
        current_task: Option<String>,
        completed: usize,
        total: usize,
    ) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            state,
            current_task,
            completed,
            total,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id() {
        let id = TaskId::new("task-1");
        assert_eq!(id.as_str(), "task-1");
        assert_eq!(id.to_string(), "task-1");
        assert_eq!(TaskId::from("task-1"), id);
    }

    #[test]
    fn test_change_counts_diff_lines() {
        let diff = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,2 +1,3 @@\n-old\n+new\n+extra\n context";
        let change = Change::new("src/lib.rs", ChangeKind::Modify).with_diff(diff);
        assert_eq!(change.lines_added, 2);
        assert_eq!(change.lines_removed, 1);
        assert_eq!(change.total_lines(), 3);
    }

    #[test]
    fn test_decision_confidence_is_clamped() {
        let high = Decision::new(AgentState::Planning, DecisionType::Plan, "r", 1.7);
        assert_eq!(high.confidence, 1.0);

        let low = Decision::new(AgentState::Planning, DecisionType::Plan, "r", -0.2);
        assert_eq!(low.confidence, 0.0);

        let nan = Decision::new(AgentState::Planning, DecisionType::Plan, "r", f64::NAN);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn test_decision_type_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionType::RequestChanges).unwrap();
        assert_eq!(json, "\"request_changes\"");
    }

    #[test]
    fn test_progress_percentage() {
        let progress = Progress::new(AgentState::Executing, Some("build".into()), 1, 4);
        assert_eq!(progress.percentage, 25.0);

        let empty = Progress::new(AgentState::Idle, None, 0, 0);
        assert_eq!(empty.percentage, 0.0);
    }

    #[test]
    fn test_project_context_prompt() {
        let mut context = ProjectContext::new()
            .with_root("/repo")
            .with_project_type("rust");
        context.add_key_file("Cargo.toml");

        let prompt = context.to_prompt_context();
        assert!(prompt.contains("Project Root: /repo"));
        assert!(prompt.contains("Project Type: rust"));
        assert!(prompt.contains("- Cargo.toml"));
    }
}
