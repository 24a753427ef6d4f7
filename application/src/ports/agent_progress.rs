//! Agent execution progress port.
//!
//! [`AgentProgressNotifier`] is an **output port** that the presentation layer
//! implements to display real-time engine progress to the user.
//! All callback argument types come from the domain layer.
//!
//! # Callback Categories
//!
//! - **State callbacks**: state machine transitions and recorded decisions
//! - **Plan/Task callbacks**: plan creation and individual task execution
//! - **Review callbacks**: reviewer verdicts and constraint violations
//! - **Run callbacks**: checkpoints and final completion
//!
//! # Example Implementation
//!
//! ```ignore
//! use conductor_application::ports::agent_progress::AgentProgressNotifier;
//!
//! struct MyProgress;
//!
//! impl AgentProgressNotifier for MyProgress {
//!     fn on_state_change(&self, from: AgentState, to: AgentState) {
//!         println!("{} -> {}", from, to);
//!     }
//! }
//! ```

use conductor_domain::{
    AgentState, CheckpointId, Decision, Plan, ReviewResult, Task, TaskResult, Violation,
};

/// Progress notifier for engine execution.
///
/// All methods have default no-op implementations, so implementers only
/// need to override the callbacks they care about.
pub trait AgentProgressNotifier: Send + Sync {
    /// Called after the engine moves to a new state
    fn on_state_change(&self, _from: AgentState, _to: AgentState) {}

    /// Called for every decision appended to the history
    fn on_decision(&self, _decision: &Decision) {}

    /// Called when a plan has been generated or revised
    fn on_plan(&self, _plan: &Plan) {}

    /// Called when a task begins execution
    fn on_task_start(&self, _task: &Task) {}

    /// Called when a task settles (success or failure)
    fn on_task_complete(&self, _task: &Task, _result: &TaskResult) {}

    /// Called for each advisory constraint violation
    fn on_violation(&self, _task: &Task, _violation: &Violation) {}

    /// Called when the reviewer returns a verdict
    fn on_review(&self, _review: &ReviewResult) {}

    /// Called after an in-loop checkpoint was saved
    fn on_checkpoint(&self, _id: &CheckpointId) {}

    /// Called once when the run ends, successfully or not
    fn on_complete(&self, _state: AgentState, _summary: &str) {}
}

/// No-op progress notifier
pub struct NoAgentProgress;

impl AgentProgressNotifier for NoAgentProgress {}
