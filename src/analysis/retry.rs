use crate::error::AnalysisError;
use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with a cap, shared by every OCR and answer backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,

    /// Bound on a single attempt; hitting it counts as a failed attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay after the 0-based `attempt` failed: `min(base * 2^attempt, max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Every delay slept on persistent failure, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for(attempt)).collect()
    }

    /// Longest one operation can take: every attempt timing out plus every backoff
    pub fn budget(&self) -> Duration {
        let attempts = self.attempt_timeout.saturating_mul(self.max_attempts.max(1));
        self.schedule().into_iter().fold(attempts, Duration::saturating_add)
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The closure receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, AnalysisError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = None;

        for n in 0..attempts {
            let result = match tokio::time::timeout(self.attempt_timeout, attempt(n)).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout { operation: operation.to_string(), duration: self.attempt_timeout }),
            };

            match result {
                Ok(value) => {
                    if n > 0 {
                        info!("{} succeeded on attempt {}/{}", operation, n + 1, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    debug!("{} failed without retry: {}", operation, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", operation, n + 1, attempts, e);
                    last = Some(e);
                    if n + 1 < attempts {
                        let delay = self.delay_for(n);
                        debug!("Retrying {} in {:?}", operation, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AnalysisError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}
