//! Retry logic with exponential backoff for transient errors.
//!
//! Resources never retry on their own. The driver in [`crate::executor`]
//! re-runs whole passes through this module, which is safe because every
//! converge and teardown step tolerates work that is already done.

use std::thread;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Execute an operation, retrying while `is_retryable` accepts the error.
///
/// `on_retry` is called before each sleep with the 1-indexed attempt that
/// failed, the error and the delay until the next attempt.
pub fn with_retry<T, E, F, R, C>(
    config: &RetryConfig,
    is_retryable: R,
    mut on_retry: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    C: FnMut(u32, &E, Duration),
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) || attempt + 1 >= config.max_attempts.max(1) {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                on_retry(attempt + 1, &e, delay);
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
