//! Resilience configuration from TOML
//!
//! `[retry]`, `[circuit_breaker]` and `[rate_limit]`. Durations are written
//! as plain integers (milliseconds for retry delays, seconds for the
//! breaker reset) so the files stay easy to edit by hand.

use conductor_application::config::DEFAULT_RETRYABLE_ERRORS;
use conductor_application::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw retry configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetryConfig {
    /// Retry failed phase handlers
    pub apply_to_phases: bool,
    /// Retry failed tool calls inside a task
    pub apply_to_tools: bool,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: f64,
    /// Error substrings treated as transient
    pub retryable_errors: Vec<String>,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        Self {
            apply_to_phases: true,
            apply_to_tools: false,
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter: 0.1,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FileRetryConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_factor(self.backoff_factor)
            .with_jitter(self.jitter)
            .with_retryable_errors(self.retryable_errors.clone())
    }
}

/// Raw circuit breaker configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCircuitBreakerConfig {
    /// Guard planner and reviewer calls with a breaker
    pub enabled: bool,
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
}

impl Default for FileCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_failures: 5,
            reset_timeout_secs: 30,
        }
    }
}

impl FileCircuitBreakerConfig {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

/// Raw rate limit configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRateLimitConfig {
    /// Throttle planner and reviewer calls
    pub enabled: bool,
    pub requests_per_minute: f64,
    pub burst_size: u32,
}

impl Default for FileRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60.0,
            burst_size: 10,
        }
    }
}

impl FileRateLimitConfig {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            burst_size: self.burst_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_application() {
        assert_eq!(
            FileRetryConfig::default().to_retry_config(),
            RetryConfig::default()
        );
        assert_eq!(
            FileCircuitBreakerConfig::default().to_breaker_config(),
            CircuitBreakerConfig::default()
        );
        assert_eq!(
            FileRateLimitConfig::default().to_rate_limit_config(),
            RateLimitConfig::default()
        );
    }

    #[test]
    fn test_retry_section_units() {
        let toml_str = r#"
[retry]
max_retries = 5
initial_delay_ms = 250
max_delay_ms = 4000
retryable_errors = ["busy"]
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
        assert_eq!(retry.max_delay, Duration::from_secs(4));
        assert_eq!(retry.retryable_errors, vec!["busy"]);
        assert!(config.retry.apply_to_phases);
    }
}
