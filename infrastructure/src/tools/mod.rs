//! Tool implementations for the agent engine
//!
//! This module provides concrete [`Tool`](conductor_application::Tool)
//! implementations that act on the local machine, and the registry the
//! engine resolves them through.
//!
//! - `command`: `run_command`, a shell command runner with optional
//!   git-based change detection

pub mod command;

mod changes;
mod registry;

pub use command::{CommandTool, RUN_COMMAND};
pub use registry::LocalToolRegistry;
