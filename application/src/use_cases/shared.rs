//! Shared utilities for use cases.
//!
//! Contains cancellation checking, the exclusive in-flight claim shared by
//! runs and checkpoint restores, and the collaborator guard that puts a
//! rate limiter and a circuit breaker in front of planner/reviewer calls.

use crate::resilience::{BreakerError, CircuitBreaker, RateLimiter};
use crate::use_cases::run_agent::RunAgentError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Check if cancellation has been requested.
///
/// Returns `Err(RunAgentError::Cancelled)` if the token is cancelled.
pub(crate) fn check_cancelled(token: &CancellationToken) -> Result<(), RunAgentError> {
    if token.is_cancelled() {
        return Err(RunAgentError::Cancelled);
    }
    Ok(())
}

/// Exclusive hold on the engine's in-flight flag, released on drop.
pub(crate) struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    /// Sets the flag, or returns `None` when it is already held.
    pub(crate) fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Error, Debug)]
pub enum GuardError<E> {
    #[error("cancelled while waiting for rate limiter")]
    Cancelled,

    #[error("circuit breaker '{0}' is open")]
    Open(String),

    #[error(transparent)]
    Call(E),
}

/// Optional limiter + breaker wrapped around a collaborator call.
///
/// The limiter is waited on first, then the call goes through the breaker.
#[derive(Debug, Clone, Default)]
pub struct CollaboratorGuard {
    limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl CollaboratorGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub async fn call<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(limiter) = &self.limiter {
            limiter
                .wait(Some(cancel))
                .await
                .map_err(|_| GuardError::Cancelled)?;
        }
        match &self.breaker {
            Some(breaker) => breaker.execute(operation, op).await.map_err(|e| match e {
                BreakerError::Open { name } => GuardError::Open(name),
                BreakerError::Operation(e) => GuardError::Call(e),
            }),
            None => op().await.map_err(GuardError::Call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RateLimitConfig};
    use std::time::Duration;

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token).is_ok());
        token.cancel();
        assert!(check_cancelled(&token).unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_passes_through_without_primitives() {
        let guard = CollaboratorGuard::new();
        let token = CancellationToken::new();
        let value: Result<u8, GuardError<String>> =
            guard.call("plan", &token, || async { Ok(3) }).await;
        assert_eq!(value.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_reports_open_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(
            "reviewer",
            CircuitBreakerConfig {
                max_failures: 1,
                reset_timeout: Duration::from_secs(60),
            },
        ));
        let guard = CollaboratorGuard::new().with_breaker(breaker);
        let token = CancellationToken::new();

        let first: Result<(), GuardError<String>> =
            guard.call("review", &token, || async { Err("503".to_string()) }).await;
        assert!(matches!(first, Err(GuardError::Call(_))));

        let second: Result<(), GuardError<String>> =
            guard.call("review", &token, || async { Ok(()) }).await;
        assert!(matches!(second, Err(GuardError::Open(name)) if name == "reviewer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_cancelled_while_rate_limited() {
        let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
            requests_per_minute: 1.0,
            burst_size: 1,
        }));
        assert!(limiter.allow());
        let guard = CollaboratorGuard::new().with_limiter(limiter);
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), GuardError<String>> =
            guard.call("plan", &token, || async { Ok(()) }).await;
        assert!(matches!(result, Err(GuardError::Cancelled)));
    }
}
