//! Rate-limited fetcher.
//!
//! Wraps any upstream call in a fixed-delay retry loop that only engages on
//! [`GithubError::RateLimited`]. The delay is constant; it is not
//! derived from the upstream's reset headers.
//!
//! ```text
//! attempt(op) ──▶ op() ──ok──▶ value
//!                  │
//!                  ├─ rate limited ─▶ report(-1) ─▶ sleep(delay) ─▶ op() ...
//!                  │                  (at most max_retries times)
//!                  └─ other error ──▶ Err immediately
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{FetchError, GithubError};
use crate::progress::{ProgressEvent, ProgressReporter, RATE_LIMITED};

/// Backoff policy consumed by [`RateLimitedFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn is_retryable(&self, err: &GithubError) -> bool {
        err.is_rate_limited()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(25, Duration::from_secs(15))
    }
}

pub struct RateLimitedFetcher {
    policy: RetryPolicy,
    progress: Arc<dyn ProgressReporter>,
}

impl RateLimitedFetcher {
    pub fn new(policy: RetryPolicy, progress: Arc<dyn ProgressReporter>) -> Self {
        Self { policy, progress }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// Each rate-limit hit reports a [`RATE_LIMITED`] progress event before
    /// sleeping. If that report fails the consumer is gone and the loop stops
    /// with [`FetchError::Disconnected`] instead of waiting out the delay.
    pub async fn attempt<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GithubError>>,
    {
        let mut retries = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.policy.is_retryable(&err) => {
                    if retries >= self.policy.max_retries {
                        warn!(retries, "rate limit retries exhausted");
                        return Err(FetchError::RetriesExhausted { retries });
                    }
                    retries += 1;

                    let wait = self.policy.delay.as_secs();
                    warn!(
                        retry = retries,
                        max = self.policy.max_retries,
                        wait_secs = wait,
                        "rate limited by GitHub"
                    );
                    self.progress.report(ProgressEvent::new(
                        format!(
                            "Rate limit reached, waiting {}s before retrying ({}/{})",
                            wait, retries, self.policy.max_retries
                        ),
                        RATE_LIMITED,
                    ))?;

                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
