//! Application-level configuration.
//!
//! This module provides configuration types that control how use cases behave:
//!
//! - [`ExecutionParams`] - execution loop control (iteration cap, dry run, checkpoints)
//! - [`RetryConfig`], [`CircuitBreakerConfig`], [`RateLimitConfig`] - resilience primitives

pub mod execution_params;
pub mod resilience;

pub use execution_params::{DEFAULT_TOOL, ExecutionParams};
pub use resilience::{CircuitBreakerConfig, DEFAULT_RETRYABLE_ERRORS, RateLimitConfig, RetryConfig};
