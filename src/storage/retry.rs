//! # Retrying Object Store
//!
//! The extractors call the object store exactly once. Retries are applied
//! here, around the collaborator, from the `retry` configuration section.

use super::ObjectStore;
use crate::config::RetryConfig;
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Attempt count and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Object store decorator that retries failed downloads.
pub struct RetryingObjectStore {
    inner: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl ObjectStore for RetryingObjectStore {
    fn download(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.download(container, key) {
                Ok(data) => return Ok(data),
                Err(err) if attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        container,
                        key,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Object download failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "Object download failed after {} attempt(s)",
                        attempt
                    )))
                }
            }
        }
    }
}
