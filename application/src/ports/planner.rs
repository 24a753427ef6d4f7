//! Planner port
//!
//! The planning collaborator turns a goal into an ordered task list and
//! revises that list when a cycle leaves work unfinished.

use async_trait::async_trait;
use conductor_domain::{Goal, Plan, ProjectContext, Task};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Planning failed: {0}")]
    Failed(String),
}

/// A freshly generated plan and the planner's reasoning
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub tasks: Vec<Task>,
    pub reasoning: String,
}

impl GeneratedPlan {
    pub fn new(tasks: Vec<Task>, reasoning: impl Into<String>) -> Self {
        Self {
            tasks,
            reasoning: reasoning.into(),
        }
    }
}

#[async_trait]
pub trait PlannerPort: Send + Sync {
    /// Implementations must reject goals with a blank description.
    async fn generate_plan(
        &self,
        goal: &Goal,
        context: Option<&ProjectContext>,
    ) -> Result<GeneratedPlan, PlannerError>;

    /// Returns the full replacement task list.
    async fn adapt_plan(
        &self,
        plan: &Plan,
        reason: &str,
        feedback: &[String],
    ) -> Result<Vec<Task>, PlannerError>;
}
