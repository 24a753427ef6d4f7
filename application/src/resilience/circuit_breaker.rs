//! Circuit breaker guarding one downstream dependency.
//!
//! ```text
//! Closed --(max_failures consecutive failures)--> Open
//! Open   --(reset_timeout since last failure)---> HalfOpen (one probe admitted)
//! HalfOpen --(probe succeeds)--> Closed (failure count reset)
//! HalfOpen --(probe fails)-----> Open
//! ```
//!
//! State sits behind a mutex so one breaker may be shared by concurrent
//! callers. Time comes from `tokio::time` so tests can pause the clock.

use crate::config::CircuitBreakerConfig;
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from [`CircuitBreaker::execute`].
///
/// `Open` means the call never ran; `Operation` carries the call's own error.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn transition(&mut self, name: &str, to: CircuitState) {
        if self.state != to {
            info!(breaker = name, from = %self.state, to = %to, "Circuit breaker state change");
            self.state = to;
            self.last_state_change = Instant::now();
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                last_state_change: Instant::now(),
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admission check. An open breaker whose reset timeout has elapsed
    /// moves to `HalfOpen` and admits exactly one probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.transition(&self.name, CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.probe_in_flight = false;
        if inner.state == CircuitState::HalfOpen {
            inner.transition(&self.name, CircuitState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.probe_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => inner.transition(&self.name, CircuitState::Open),
            CircuitState::Closed if inner.failures >= self.config.max_failures => {
                warn!(breaker = %self.name, failures = inner.failures, "Opening circuit breaker");
                inner.transition(&self.name, CircuitState::Open);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Time since the last state transition.
    pub fn time_in_state(&self) -> std::time::Duration {
        self.lock().last_state_change.elapsed()
    }

    /// Runs `op` if admitted and records its outcome.
    ///
    /// A call dropped before it finishes (timeout, `select!`, abort) is
    /// recorded as a failure so a half-open probe slot is never leaked.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            debug!(breaker = %self.name, operation, "Call rejected by open breaker");
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }
        let mut pending = PendingCall {
            breaker: self,
            armed: true,
        };
        let outcome = op().await;
        pending.armed = false;
        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Operation(e))
            }
        }
    }
}

/// Records a failure for an admitted call whose future was dropped.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(breaker = %self.breaker.name, "Admitted call dropped before completion");
            self.breaker.record_failure();
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .finish()
    }
}
