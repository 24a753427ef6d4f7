//! Bounded exponential backoff with retryability classification.
//!
//! Attempt 0 runs immediately. Attempt `n >= 1` runs after
//! `min(max_delay, initial_delay * backoff_factor^(n-1))`, jittered by up to
//! `+/- jitter` of that delay. Only errors whose message contains one of the
//! configured substrings are retried; anything else aborts at once.

use crate::config::RetryConfig;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a retried operation gave up.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("{operation}: non-retryable error: {source}")]
    NonRetryable { operation: String, source: E },

    #[error("{operation}: retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        source: E,
    },

    #[error("{operation}: cancelled during backoff")]
    Cancelled { operation: String },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error returned by the operation, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::NonRetryable { source, .. } | RetryError::Exhausted { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Retry policy shared read-only by every operation it wraps.
#[derive(Debug, Clone, Default)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Case-sensitive substring match against the configured list.
    pub fn is_retryable(&self, message: &str) -> bool {
        self.config
            .retryable_errors
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    /// Un-jittered delay before `attempt`; zero for the first attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
        let secs =
            self.config.initial_delay.as_secs_f64() * self.config.backoff_factor.powi(exponent);
        let max = self.config.max_delay.as_secs_f64();
        if secs.is_finite() {
            Duration::from_secs_f64(secs.clamp(0.0, max))
        } else {
            self.config.max_delay
        }
    }

    /// Delay before `attempt` with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.config.jitter;
        if base.is_zero() || jitter.is_nan() || jitter <= 0.0 {
            return base;
        }
        let jitter = jitter.min(1.0);
        let factor = rand::thread_rng().gen_range(-jitter..=jitter);
        base.mul_f64(1.0 + factor)
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of retries.
    pub async fn execute<E, F, Fut>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> Result<(), RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.execute_with_result(operation, cancel, op).await
    }

    /// Like [`execute`](Self::execute) but hands back the operation's value.
    ///
    /// `op` receives the zero-based attempt number.
    pub async fn execute_with_result<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let message = error.to_string();
            if !self.is_retryable(&message) {
                return Err(RetryError::NonRetryable {
                    operation: operation.to_string(),
                    source: error,
                });
            }
            if attempt >= self.config.max_retries {
                warn!(operation, attempts = attempt + 1, error = %message, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: error,
                });
            }

            attempt += 1;
            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Transient failure, backing off"
            );

            if let Some(token) = cancel {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(RetryError::Cancelled {
                            operation: operation.to_string(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_runs_max_retries_plus_one() {
        for max_retries in [0, 1, 3] {
            let strategy = RetryStrategy::new(fast_config().with_max_retries(max_retries));
            let calls = AtomicU32::new(0);

            let result = strategy
                .execute("flaky", None, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), String>("upstream returned 503".to_string()) }
                })
                .await;

            assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
            match result.unwrap_err() {
                RetryError::Exhausted { attempts, source, .. } => {
                    assert_eq!(attempts, max_retries + 1);
                    assert!(source.contains("503"));
                }
                other => panic!("expected Exhausted, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_runs_once() {
        let strategy = RetryStrategy::new(fast_config());
        let calls = AtomicU32::new(0);

        let result = strategy
            .execute("parse", None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), String>("invalid input".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetryable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let strategy = RetryStrategy::new(fast_config());

        let value = strategy
            .execute_with_result("fetch", None, |attempt| async move {
                if attempt < 2 {
                    Err("connection refused".to_string())
                } else {
                    Ok(attempt * 10)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let strategy = RetryStrategy::new(fast_config().with_initial_delay(Duration::from_secs(1)));
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);

        let result = strategy
            .execute("slow", Some(&token), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), String>("timeout".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.into_inner().is_none());
    }

    #[test]
    fn test_retryable_match_is_case_sensitive() {
        let strategy = RetryStrategy::default();
        assert!(strategy.is_retryable("request timeout after 30s"));
        assert!(!strategy.is_retryable("Request Timeout"));
        assert!(strategy.is_retryable("HTTP 502 Bad Gateway"));
    }

    #[test]
    fn test_base_delay_grows_and_caps() {
        let strategy = RetryStrategy::new(fast_config());
        assert_eq!(strategy.base_delay(0), Duration::ZERO);
        assert_eq!(strategy.base_delay(1), Duration::from_millis(100));
        assert_eq!(strategy.base_delay(2), Duration::from_millis(200));
        assert_eq!(strategy.base_delay(3), Duration::from_millis(400));
        assert_eq!(strategy.base_delay(10), Duration::from_secs(2));
        assert_eq!(strategy.base_delay(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let config = fast_config().with_jitter(0.25);
        let strategy = RetryStrategy::new(config.clone());
        let tolerance = 1e-6;

        for attempt in 1..8 {
            let base = strategy.base_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let delay = strategy.delay_for(attempt).as_secs_f64();
                let low = base * (1.0 - config.jitter) - tolerance;
                let high = base * (1.0 + config.jitter) + tolerance;
                assert!(delay >= low, "attempt {attempt}: {delay} too low");
                assert!(delay <= high, "attempt {attempt}: {delay} too high");
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let strategy = RetryStrategy::new(fast_config().with_jitter(0.0));
        assert_eq!(strategy.delay_for(2), strategy.base_delay(2));
    }
}
