//! Resilience primitives wrapped around collaborator calls.
//!
//! - [`RetryStrategy`] - bounded exponential backoff
//! - [`CircuitBreaker`] - stop calling a dependency while it is failing
//! - [`RateLimiter`] - token-bucket admission control
//!
//! The three are independent and compose: the engine waits on the limiter,
//! then goes through the breaker, and may retry the whole phase above both.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
pub use rate_limiter::{RateLimitError, RateLimiter};
pub use retry::{RetryError, RetryStrategy};
