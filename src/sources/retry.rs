use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ScrobbleSource, UpstreamError, UpstreamRequest};

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with up to 50% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let jitter_ms = (backoff.as_millis() as u64) / 2;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(fastrand::u64(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        backoff + jitter
    }
}

/// Wraps a [`ScrobbleSource`] and retries retryable failures.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: ScrobbleSource> ScrobbleSource for RetryingSource<S> {
    async fn fetch(&self, request: UpstreamRequest) -> Result<Value, UpstreamError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(request.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(method = %request.method, attempt, "Upstream call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "🔄 Retrying {} in {:?} (attempt {}/{}): {}",
                        request.method, delay, attempt, self.policy.max_retries, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
