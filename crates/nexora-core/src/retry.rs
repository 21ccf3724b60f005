use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::RagError;

/// Exponential backoff for transient vector-store and generator failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt + 1`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "{what} failed ({e}), retrying in {}ms ({}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        self.max_attempts - 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
