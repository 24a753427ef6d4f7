//! Mutable state of one engine.
//!
//! Every field the loop writes lives in [`AgentRuntime`] behind a single
//! `tokio::sync::RwLock`. The loop takes short write locks and never holds
//! one across a collaborator call; auto-save takes read locks and snapshots
//! by cloning.

use conductor_domain::{
    AgentState, Checkpoint, CheckpointId, Decision, Goal, Learning, Plan, Progress,
    ProjectContext, ReviewResult, TaskResult,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedRuntime = Arc<RwLock<AgentRuntime>>;

#[derive(Debug, Clone, Default)]
pub struct AgentRuntime {
    pub state: AgentState,
    pub goal: Option<Goal>,
    pub plan: Plan,
    pub decisions: Vec<Decision>,
    /// Latest result per executed task, in first-execution order
    pub completed: Vec<TaskResult>,
    pub iteration: usize,
    pub metadata: BTreeMap<String, String>,
    pub project_context: Option<ProjectContext>,
    /// Learnings recalled from memory during perception
    pub recalled: Vec<Learning>,
    /// Learnings produced by reflect phases of the current run
    pub learnings: Vec<Learning>,
    pub last_review: Option<ReviewResult>,
}

impl AgentRuntime {
    pub fn for_goal(goal: Goal) -> Self {
        Self {
            goal: Some(goal),
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedRuntime {
        Arc::new(RwLock::new(self))
    }

    /// Stores `result`, replacing an earlier result for the same task.
    pub fn record_result(&mut self, result: TaskResult) {
        match self
            .completed
            .iter_mut()
            .find(|r| r.task_id == result.task_id)
        {
            Some(existing) => *existing = result,
            None => self.completed.push(result),
        }
    }

    /// Deep copy of the durable fields.
    pub fn snapshot(&self, id: CheckpointId, timestamp: DateTime<Utc>) -> Checkpoint {
        Checkpoint {
            id,
            timestamp,
            state: self.state,
            goal: self.goal.clone(),
            plan: self.plan.clone(),
            decisions: self.decisions.clone(),
            completed: self.completed.clone(),
            iteration: self.iteration,
            metadata: self.metadata.clone(),
        }
    }

    /// Overwrites the durable fields from `checkpoint`.
    ///
    /// Per-run scratch data (project context, recalled and produced
    /// learnings, last review) is cleared; it is rebuilt on the next run.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.state = checkpoint.state;
        self.goal = checkpoint.goal;
        self.plan = checkpoint.plan;
        self.decisions = checkpoint.decisions;
        self.completed = checkpoint.completed;
        self.iteration = checkpoint.iteration;
        self.metadata = checkpoint.metadata;
        self.project_context = None;
        self.recalled.clear();
        self.learnings.clear();
        self.last_review = None;
    }

    pub fn progress(&self) -> Progress {
        Progress::new(
            self.state,
            self.plan.current().map(|t| t.name.clone()),
            self.plan.count(conductor_domain::TaskStatus::Complete),
            self.plan.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::{DecisionType, Task};

    fn populated() -> AgentRuntime {
        let mut runtime = AgentRuntime::for_goal(Goal::new("ship it"));
        runtime.state = AgentState::Executing;
        runtime.plan = Plan::new(vec![
            Task::new("1", "build", "cargo build", "run_command"),
            Task::new("2", "test", "cargo test", "run_command").with_dependency("1"),
        ]);
        runtime.plan.tasks[0].mark_in_progress();
        runtime.decisions.push(Decision::new(
            AgentState::Analyzing,
            DecisionType::Plan,
            "two tasks",
            0.8,
        ));
        runtime.iteration = 4;
        runtime
    }

    #[test]
    fn test_record_result_replaces_same_task() {
        let mut runtime = AgentRuntime::default();
        runtime.record_result(TaskResult::failure("1", "run_command", 5, "exit 1"));
        runtime.record_result(TaskResult::success("2", "run_command", 5));
        runtime.record_result(TaskResult::success("1", "run_command", 7));

        assert_eq!(runtime.completed.len(), 2);
        assert!(runtime.completed[0].success);
        assert_eq!(runtime.completed[0].duration_ms, 7);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let runtime = populated();
        let checkpoint = runtime.snapshot(CheckpointId::new("checkpoint_1_0000"), Utc::now());

        let mut restored = AgentRuntime::default();
        restored.learnings.push(Learning::new("x", "y", 0.5));
        restored.restore(checkpoint.clone());

        assert_eq!(restored.state, AgentState::Executing);
        assert_eq!(restored.plan, runtime.plan);
        assert_eq!(restored.decisions, runtime.decisions);
        assert_eq!(restored.iteration, 4);
        assert!(restored.learnings.is_empty());
        assert_eq!(
            restored.snapshot(checkpoint.id.clone(), checkpoint.timestamp),
            checkpoint
        );
    }

    #[test]
    fn test_progress_reports_current_task() {
        let progress = populated().progress();
        assert_eq!(progress.current_task.as_deref(), Some("build"));
        assert_eq!(progress.completed, 0);
        assert_eq!(progress.total, 2);
    }
}
