//! Agent domain entities

use super::value_objects::{TaskId, TaskResult};
use crate::core::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// State of the agent execution engine.
///
/// Exactly one engine instance owns the current state and only the
/// execution loop writes it. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// No goal is being worked on
    #[default]
    Idle,
    /// Perception finished; the goal and its context are being analyzed for planning
    Analyzing,
    /// A plan is in place and tasks are ready to run
    Planning,
    /// Tasks are being executed one at a time
    Executing,
    /// All runnable tasks settled; changes go to review
    Reviewing,
    /// Results are aggregated and a learning is derived
    Reflecting,
    /// The goal was achieved
    Complete,
    /// The run stopped on an unrecovered error
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Analyzing => "analyzing",
            AgentState::Planning => "planning",
            AgentState::Executing => "executing",
            AgentState::Reviewing => "reviewing",
            AgentState::Reflecting => "reflecting",
            AgentState::Complete => "complete",
            AgentState::Failed => "failed",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AgentState::Idle => "Idle",
            AgentState::Analyzing => "Analyzing",
            AgentState::Planning => "Planning",
            AgentState::Executing => "Executing",
            AgentState::Reviewing => "Reviewing",
            AgentState::Reflecting => "Reflecting",
            AgentState::Complete => "Complete",
            AgentState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Complete | AgentState::Failed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Priority of a goal or task
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" | "normal" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            "critical" | "crit" | "c" => Ok(Priority::Critical),
            _ => Err(DomainError::UnknownPriority(s.to_string())),
        }
    }
}

/// The user-supplied objective the engine works towards.
///
/// Owned by the caller and read-only to the engine for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// Free-text constraints, e.g. "no new dependencies"
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Source/context reference (usually a project path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            priority: Priority::default(),
            constraints: Vec::new(),
            deadline: None,
            context: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Rejects goals whose description is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.description.trim().is_empty() {
            return Err(DomainError::EmptyGoal);
        }
        Ok(())
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now > d)
    }
}

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// A unit of work derived from a goal by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt handed to the executing tool
    pub prompt: String,
    #[serde(default)]
    pub priority: Priority,
    /// Name of the tool expected to run this task
    pub tool: String,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        prompt: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            prompt: prompt.into(),
            priority: Priority::default(),
            tool: tool.into(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, task_id: impl Into<TaskId>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }

    /// Pending and every dependency already complete.
    pub fn is_ready(&self, completed: &[&TaskId]) -> bool {
        self.status == TaskStatus::Pending
            && self.depends_on.iter().all(|dep| completed.contains(&dep))
    }

    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Settles the task from its result: `Complete` on success, `Failed` otherwise.
    pub fn settle(&mut self, result: TaskResult) {
        self.status = if result.success {
            TaskStatus::Complete
        } else {
            TaskStatus::Failed
        };
        self.result = Some(result);
    }

    /// Puts the task back in the queue, dropping its previous result.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.result = None;
    }
}

/// Ordered list of tasks owned by the running agent.
///
/// Serialized as a bare task array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Index of the first ready task in list order.
    pub fn next_ready(&self) -> Option<usize> {
        let completed: Vec<&TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete)
            .map(|t| &t.id)
            .collect();
        self.tasks.iter().position(|t| t.is_ready(&completed))
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Any task still pending or failed means another cycle is needed.
    pub fn needs_more_work(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Failed))
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
    }

    /// Tasks interrupted mid-flight go back to pending. Returns how many.
    pub fn reset_in_progress(&mut self) -> usize {
        self.reset_where(|s| s == TaskStatus::InProgress)
    }

    /// Failed tasks go back to pending. Returns how many.
    pub fn reset_failed(&mut self) -> usize {
        self.reset_where(|s| s == TaskStatus::Failed)
    }

    /// Every task that did not fail goes back to pending. Returns how many.
    pub fn reset_non_failed(&mut self) -> usize {
        self.reset_where(|s| s != TaskStatus::Failed)
    }

    fn reset_where(&mut self, pred: impl Fn(TaskStatus) -> bool) -> usize {
        let mut reset = 0;
        for task in self.tasks.iter_mut().filter(|t| pred(t.status)) {
            task.reset();
            reset += 1;
        }
        reset
    }

    /// Settled tasks over total.
    pub fn progress(&self) -> (usize, usize) {
        let settled = self.tasks.iter().filter(|t| t.status.is_settled()).count();
        (settled, self.tasks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task::new(id, format!("task {id}"), "do it", "coder")
    }

    #[test]
    fn test_agent_state_terminal() {
        assert!(AgentState::Complete.is_terminal());
        assert!(AgentState::Failed.is_terminal());
        assert!(!AgentState::Idle.is_terminal());
        assert!(!AgentState::Reflecting.is_terminal());
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("crit".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("someday".parse::<Priority>().is_err());
    }

    #[test]
    fn test_goal_validation() {
        assert!(Goal::new("fix bug").validate().is_ok());
        assert_eq!(Goal::new("   ").validate(), Err(DomainError::EmptyGoal));
    }

    #[test]
    fn test_task_dependencies() {
        let first = task("1");
        let second = task("2").with_dependency("1");
        let done = TaskId::new("1");

        assert!(first.is_ready(&[]));
        assert!(!second.is_ready(&[]));
        assert!(second.is_ready(&[&done]));
    }

    #[test]
    fn test_next_ready_is_first_match_in_list_order() {
        let mut plan = Plan::new(vec![task("1"), task("2"), task("3")]);
        assert_eq!(plan.next_ready(), Some(0));

        plan.tasks[0].settle(TaskResult::success("1", "coder", 5));
        assert_eq!(plan.next_ready(), Some(1));
    }

    #[test]
    fn test_next_ready_skips_blocked_tasks() {
        let mut plan = Plan::new(vec![task("1"), task("2").with_dependency("1"), task("3")]);
        plan.tasks[0].settle(TaskResult::failure("1", "coder", 5, "boom"));

        assert_eq!(plan.next_ready(), Some(2));
        plan.tasks[2].settle(TaskResult::success("3", "coder", 5));
        assert_eq!(plan.next_ready(), None);
        assert!(plan.needs_more_work());
    }

    #[test]
    fn test_plan_resets() {
        let mut plan = Plan::new(vec![task("1"), task("2"), task("3")]);
        plan.tasks[0].settle(TaskResult::success("1", "coder", 1));
        plan.tasks[1].settle(TaskResult::failure("2", "coder", 1, "x"));
        plan.tasks[2].mark_in_progress();

        assert_eq!(plan.reset_in_progress(), 1);
        assert_eq!(plan.tasks[2].status, TaskStatus::Pending);

        assert_eq!(plan.reset_non_failed(), 2);
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
        assert!(plan.tasks[0].result.is_none());
        assert_eq!(plan.tasks[1].status, TaskStatus::Failed);

        assert_eq!(plan.reset_failed(), 1);
        assert_eq!(plan.count(TaskStatus::Pending), 3);
    }

    #[test]
    fn test_plan_progress() {
        let mut plan = Plan::new(vec![task("1"), task("2")]);
        assert_eq!(plan.progress(), (0, 2));
        plan.tasks[0].settle(TaskResult::success("1", "coder", 1));
        assert_eq!(plan.progress(), (1, 2));
        assert!(plan.needs_more_work());
        plan.tasks[1].settle(TaskResult::success("2", "coder", 1));
        assert!(!plan.needs_more_work());
    }

    #[test]
    fn test_plan_serializes_as_array() {
        let plan = Plan::new(vec![task("1")]);
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json.is_array());
    }
}
