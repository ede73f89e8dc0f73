//! Bounded retry with GitHub rate-limit awareness.

use std::future::Future;
use std::time::Duration;

use bounty_core::{BountyError, GitHubConfig};
use chrono::Utc;
use tracing::warn;

/// Retry budget for upstream calls.
///
/// After a failed attempt that is not the last one, the policy either waits
/// for the rate-limit reset carried by the error or sleeps
/// `base_delay * 2^attempt`, never both. The final attempt's error is
/// returned as-is.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bounty_context::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// assert_eq!(policy.backoff(0), Duration::from_millis(1000));
/// assert_eq!(policy.backoff(1), Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from the `[github]` configuration section.
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Backoff slept after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `label` names the call in log lines.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, BountyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BountyError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt + 1 >= max_attempts {
                return Err(err);
            }

            let delay = match self.rate_limit_wait(&err) {
                Some(wait) => {
                    warn!(
                        call = label,
                        attempt = attempt + 1,
                        max_attempts,
                        "rate limit exceeded, waiting {}ms until reset",
                        wait.as_millis()
                    );
                    wait
                }
                None => {
                    let delay = self.backoff(attempt);
                    warn!(
                        call = label,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "retrying after {}ms",
                        delay.as_millis()
                    );
                    delay
                }
            };
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Time left until the reset carried by a rate-limit error.
    ///
    /// A reset already in the past yields `None`, so the attempt falls back
    /// to the ordinary backoff.
    fn rate_limit_wait(&self, err: &BountyError) -> Option<Duration> {
        let reset_at = err.rate_limit_reset()?;
        (reset_at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }
}
