//! Resilience configuration - retry, circuit breaker and rate limit settings.
//!
//! Each type is immutable once handed to its primitive and is shared
//! read-only by every call going through it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error substrings treated as transient by default
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "timeout",
    "connection refused",
    "rate limit",
    "502",
    "503",
    "504",
    "temporarily unavailable",
];

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (`max_retries + 1` attempts in total).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction of the computed delay used as +/- jitter, `0.0..=1.0`.
    pub jitter: f64,
    /// An error is retried only if its message contains one of these
    /// (case-sensitive).
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.1,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.backoff_factor.is_finite() && self.backoff_factor >= 1.0) {
            return Err(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be within 0.0..=1.0, got {}", self.jitter));
        }
        if self.max_delay < self.initial_delay {
            return Err("max_delay must not be shorter than initial_delay".to_string());
        }
        Ok(())
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_errors(mut self, errors: Vec<String>) -> Self {
        self.retryable_errors = errors;
        self
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub max_failures: u32,
    /// Time since the last failure before a probe is admitted.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_failures == 0 {
            return Err("max_failures must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: f64,
    /// Bucket capacity; also the number of tokens the bucket starts with.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60.0,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.requests_per_minute.is_finite() && self.requests_per_minute > 0.0) {
            return Err("requests_per_minute must be positive".to_string());
        }
        if self.burst_size == 0 {
            return Err("burst_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Refill rate in tokens per second.
    pub fn refill_per_second(&self) -> f64 {
        self.requests_per_minute / 60.0
    }
}
