//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted to application types with
//! the `to_*` helpers once validated.

mod engine;
mod output;
mod resilience;
mod storage;

pub use engine::FileEngineConfig;
pub use output::{FileOutputConfig, FileOutputFormat};
pub use resilience::{FileCircuitBreakerConfig, FileRateLimitConfig, FileRetryConfig};
pub use storage::{FileCheckpointConfig, FileMemoryConfig, default_data_dir};

use conductor_application::ExecutionParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("[engine] {0}")]
    Engine(String),

    #[error("[retry] {0}")]
    Retry(String),

    #[error("[circuit_breaker] {0}")]
    CircuitBreaker(String),

    #[error("[rate_limit] {0}")]
    RateLimit(String),

    #[error("[checkpoint] auto_save_secs cannot be 0")]
    InvalidAutoSave,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Loop settings
    pub engine: FileEngineConfig,
    /// Backoff for phases and tool calls
    pub retry: FileRetryConfig,
    /// Breaker around planner and reviewer calls
    pub circuit_breaker: FileCircuitBreakerConfig,
    /// Token bucket around planner and reviewer calls
    pub rate_limit: FileRateLimitConfig,
    /// Checkpoint persistence
    pub checkpoint: FileCheckpointConfig,
    /// Long-term memory
    pub memory: FileMemoryConfig,
    /// Output settings
    pub output: FileOutputConfig,
}

impl FileConfig {
    /// Validate every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.checkpoint.auto_save_secs == Some(0) {
            return Err(ConfigValidationError::InvalidAutoSave);
        }
        if self.engine.command_timeout_secs == 0 {
            return Err(ConfigValidationError::Engine(
                "command_timeout_secs cannot be 0".to_string(),
            ));
        }
        self.to_execution_params()
            .validate()
            .map_err(ConfigValidationError::Engine)?;
        self.retry
            .to_retry_config()
            .validate()
            .map_err(ConfigValidationError::Retry)?;
        if self.circuit_breaker.enabled {
            self.circuit_breaker
                .to_breaker_config()
                .validate()
                .map_err(ConfigValidationError::CircuitBreaker)?;
        }
        if self.rate_limit.enabled {
            self.rate_limit
                .to_rate_limit_config()
                .validate()
                .map_err(ConfigValidationError::RateLimit)?;
        }
        Ok(())
    }

    /// Engine parameters including the checkpoint cadence.
    pub fn to_execution_params(&self) -> ExecutionParams {
        let params = self.engine.to_execution_params();
        if !self.checkpoint.enabled {
            return params;
        }
        params
            .with_checkpoint_every(self.checkpoint.every)
            .with_auto_save_interval(self.checkpoint.auto_save_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[engine]
max_iterations = 30
working_dir = "/srv/app"

[retry]
apply_to_tools = true
max_retries = 1

[circuit_breaker]
enabled = true
max_failures = 2

[rate_limit]
enabled = true
requests_per_minute = 30.0

[checkpoint]
every = 5

[output]
format = "json"
color = false
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());

        let params = config.to_execution_params();
        assert_eq!(params.max_iterations, 30);
        assert_eq!(params.working_dir.as_deref(), Some("/srv/app"));
        assert_eq!(params.checkpoint_every, 5);
        assert!(config.retry.apply_to_tools);
        assert_eq!(config.circuit_breaker.to_breaker_config().max_failures, 2);
        assert_eq!(config.rate_limit.to_rate_limit_config().burst_size, 10);
        assert_eq!(config.output.format, FileOutputFormat::Json);
        assert!(!config.output.color);
    }

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.checkpoint.enabled);
        assert!(config.memory.enabled);
        assert!(!config.circuit_breaker.enabled);
        assert!(!config.rate_limit.enabled);

        let params = config.to_execution_params();
        assert_eq!(params, ExecutionParams::default().with_checkpoint_every(1));
    }

    #[test]
    fn test_disabled_checkpoints_clear_cadence() {
        let toml_str = r#"
[checkpoint]
enabled = false
every = 3
auto_save_secs = 10
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let params = config.to_execution_params();
        assert_eq!(params.checkpoint_every, 0);
        assert!(params.auto_save_interval.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = FileConfig::default();
        config.engine.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::Engine(_))
        ));

        let mut config = FileConfig::default();
        config.retry.jitter = 2.0;
        assert!(matches!(config.validate(), Err(ConfigValidationError::Retry(_))));

        let mut config = FileConfig::default();
        config.checkpoint.auto_save_secs = Some(0);
        assert_eq!(config.validate(), Err(ConfigValidationError::InvalidAutoSave));

        // Disabled sections are not checked
        let mut config = FileConfig::default();
        config.circuit_breaker.max_failures = 0;
        assert!(config.validate().is_ok());
        config.circuit_breaker.enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::CircuitBreaker(_))
        ));
    }
}
