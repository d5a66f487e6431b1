//! Retry with exponential backoff for page requests

use std::time::Duration;

use crate::error::FetchError;

/// Attempt ceiling and base delay for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^retry (0.5s, 1s, 2s, ... with defaults)
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Retry a fallible request with exponential backoff.
///
/// Transient errors are retried until `policy.max_attempts` is reached, sleeping
/// through `sleep` in between. Fatal errors return immediately. On exhaustion the
/// last transient error is wrapped in [`FetchError::Exhausted`], which is fatal.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    sleep: &dyn Fn(Duration),
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= max_attempts {
                    log::error!("{label}: failed permanently after {attempt} attempts: {e}");
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.backoff_duration(attempt - 1);
                log::warn!("{label}: attempt {attempt}/{max_attempts} failed: {e}, retry in {delay:?}");
                sleep(delay);
            }
            Err(e) => {
                log::error!("{label}: {e}");
                return Err(e);
            }
        }
    }
}
