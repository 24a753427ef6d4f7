//! Infrastructure layer for conductor
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod analyzer;
pub mod checkpoint;
pub mod config;
pub mod memory;
pub mod planner;
pub mod tools;

// Re-export commonly used types
pub use analyzer::LocalProjectAnalyzer;
pub use checkpoint::FileCheckpointStore;
pub use config::{
    ConfigLoader, ConfigSource, ConfigValidationError, FileConfig, FileOutputConfig,
    FileOutputFormat,
};
pub use memory::JsonlMemoryStore;
pub use planner::TaskFilePlanner;
pub use tools::{CommandTool, LocalToolRegistry};
