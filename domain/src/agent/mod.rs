//! Agent domain module
//!
//! Contains agent state, goals, plans, tasks, checkpoints and the
//! records a run produces (decisions, results, learnings).

pub mod checkpoint;
pub mod entities;
pub mod value_objects;

pub use checkpoint::{CHECKPOINT_PREFIX, Checkpoint, CheckpointId};
pub use entities::{AgentState, Goal, Plan, Priority, Task, TaskStatus};
pub use value_objects::{
    Change, ChangeKind, Decision, DecisionType, Learning, Progress, ProjectContext, ReviewResult,
    ReviewVerdict, TaskId, TaskResult,
};
