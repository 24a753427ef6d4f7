//! Application layer for conductor
//!
//! This crate contains the agent engine, its resilience primitives and
//! telemetry, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod resilience;
pub mod telemetry;
pub mod use_cases;

// Re-export commonly used types
pub use config::{
    CircuitBreakerConfig, DEFAULT_TOOL, ExecutionParams, RateLimitConfig, RetryConfig,
};
pub use ports::{
    agent_progress::{AgentProgressNotifier, NoAgentProgress},
    checkpoint_store::{CheckpointError, CheckpointStore, InMemoryCheckpointStore},
    memory::{MemoryError, MemoryPort},
    planner::{GeneratedPlan, PlannerError, PlannerPort},
    project_analyzer::{AnalyzerError, ProjectAnalyzerPort},
    reviewer::{ReviewerError, ReviewerPort},
    tool_registry::{Tool, ToolError, ToolOutput, ToolParams, ToolRegistryPort},
};
pub use resilience::{CircuitBreaker, CircuitState, RateLimiter, RetryStrategy};
pub use telemetry::Metrics;
pub use use_cases::checkpoint::CheckpointManager;
pub use use_cases::run_agent::{AgentEngine, ExecutionResult, RunAgentError};
