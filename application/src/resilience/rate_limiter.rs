//! Token-bucket rate limiter.
//!
//! The bucket starts full (`burst_size` tokens) and refills lazily at
//! `requests_per_minute / 60` tokens per second, capped at capacity.

use crate::config::RateLimitConfig;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Interval between admission checks in [`RateLimiter::wait`]
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("cancelled while waiting for rate limit")]
    Cancelled,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst_size);
        Self {
            capacity,
            refill_per_sec: config.refill_per_second(),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consumes one token if a whole token is available.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Polls [`allow`](Self::allow) until admitted or `cancel` fires.
    pub async fn wait(&self, cancel: Option<&CancellationToken>) -> Result<(), RateLimitError> {
        loop {
            if self.allow() {
                return Ok(());
            }
            trace!("Rate limited, waiting for a token");
            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(RateLimitError::Cancelled),
                        _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
                    }
                }
                None => tokio::time::sleep(WAIT_POLL_INTERVAL).await,
            }
        }
    }

    /// Tokens currently in the bucket, without refilling.
    pub fn available(&self) -> f64 {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner()).tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            requests_per_minute: rpm,
            burst_size: burst,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refusal_until_refill() {
        let rl = limiter(60.0, 3);
        for _ in 0..3 {
            assert!(rl.allow());
        }
        assert!(!rl.allow());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!rl.allow(), "half a token is not enough");

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(rl.allow());
        assert!(!rl.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_capacity() {
        let rl = limiter(600.0, 2);
        assert!(rl.allow());
        assert!(rl.allow());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rl.allow());
        assert!(rl.allow());
        assert!(!rl.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_admits_after_refill() {
        let rl = limiter(60.0, 1);
        assert!(rl.allow());

        let start = Instant::now();
        rl.wait(None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_cancellation() {
        let rl = limiter(1.0, 1);
        assert!(rl.allow());

        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            child.cancel();
        });

        let result = rl.wait(Some(&token)).await;
        assert_eq!(result, Err(RateLimitError::Cancelled));
    }
}
