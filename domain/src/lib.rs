//! Domain layer for conductor
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Agent
//!
//! An agent drives one [`Goal`] through a fixed state machine:
//!
//! ```text
//! Idle -> Analyzing -> Planning -> Executing -> Reviewing -> Reflecting -> Complete
//!                         ^                         |             |
//!                         +------- reject ----------+-- re-plan --+
//! ```
//!
//! Every transition is recorded as a [`Decision`]; every executed task
//! yields a [`TaskResult`].
//!
//! ## Checkpoints
//!
//! A [`Checkpoint`] is a deep copy of the agent's mutable fields that can be
//! persisted and restored later.
//!
//! ## Policy
//!
//! [`ConstraintValidator`] turns free-text goal constraints into checks over
//! the [`Change`]s a tool proposes.

pub mod agent;
pub mod core;
pub mod policy;

// Re-export commonly used types
pub use agent::{
    checkpoint::{CHECKPOINT_PREFIX, Checkpoint, CheckpointId},
    entities::{AgentState, Goal, Plan, Priority, Task, TaskStatus},
    value_objects::{
        Change, ChangeKind, Decision, DecisionType, Learning, Progress, ProjectContext,
        ReviewResult, ReviewVerdict, TaskId, TaskResult,
    },
};
pub use core::error::DomainError;
pub use policy::constraint::{ConstraintValidator, PolicyRule, Violation};
