//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.
//! Every collaborator except the tool registry is optional to the engine.

pub mod agent_progress;
pub mod checkpoint_store;
pub mod memory;
pub mod planner;
pub mod project_analyzer;
pub mod reviewer;
pub mod tool_registry;
