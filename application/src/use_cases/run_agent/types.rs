//! Type definitions for the RunAgent use case.

use crate::ports::checkpoint_store::CheckpointError;
use crate::ports::planner::PlannerError;
use crate::ports::reviewer::ReviewerError;
use conductor_domain::{AgentState, Decision, Goal, Learning, TaskResult};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the engine to its caller
#[derive(Error, Debug)]
pub enum RunAgentError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent is already running")]
    AlreadyRunning,

    #[error("No goal to resume")]
    NoGoal,

    #[error("Max iterations ({0}) exceeded")]
    MaxIterationsExceeded(usize),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{phase} phase failed: {source}")]
    PhaseFailed {
        phase: AgentState,
        #[source]
        source: PhaseError,
    },

    #[error("{phase} phase failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        phase: AgentState,
        attempts: u32,
        #[source]
        source: PhaseError,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl RunAgentError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunAgentError::Cancelled)
    }

    /// Wraps a handler error with the phase it happened in.
    pub(crate) fn from_phase(phase: AgentState, error: PhaseError) -> Self {
        match error {
            PhaseError::Cancelled => RunAgentError::Cancelled,
            PhaseError::NoGoal => RunAgentError::NoGoal,
            source => RunAgentError::PhaseFailed { phase, source },
        }
    }
}

/// Error raised inside a phase handler.
///
/// Only collaborator failures that the phase cannot absorb end up here;
/// everything non-fatal is logged and skipped by the handler itself.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("no goal loaded")]
    NoGoal,

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Reviewer(#[from] ReviewerError),
}

/// Outcome of one execution.
///
/// Always carries the final state, total duration and a human-readable
/// summary, including when the run failed part way.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub state: AgentState,
    pub goal: Option<Goal>,
    pub summary: String,
    pub duration_ms: u64,
    pub iterations: usize,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    /// Latest result per executed task
    pub results: Vec<TaskResult>,
    pub decisions: Vec<Decision>,
    /// Learnings produced by each reflect phase of this run
    pub learnings: Vec<Learning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn violation_count(&self) -> usize {
        self.results.iter().map(|r| r.violations.len()).sum()
    }
}
