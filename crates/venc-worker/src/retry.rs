//! Retry with exponential backoff for upload operations.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Backoff configuration. Only uploads retry; encode failures indicate a
/// content or configuration problem and never do.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub base_delay: Duration,
    /// Backoff multiplier per attempt
    pub multiplier: f64,
    /// Ceiling for the wait between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Wait before attempt `attempt` (attempt 2 waits `base_delay`).
    fn delay_before_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exp as i32);
        Duration::from_secs_f64(delay).min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The surrounding job was cancelled while waiting between attempts.
    Cancelled,
    /// Every attempt failed; carries the last error.
    Exhausted { error: E, attempts: u32 },
}

/// Run `operation` with exponential backoff, checking the cancel signal
/// while sleeping between attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &mut watch::Receiver<bool>,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        if *cancel.borrow() {
            return Err(RetryError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < config.max_attempts {
                    let delay = config.delay_before_attempt(attempt + 1);
                    warn!(
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = cancel.changed() => {
                            if changed.is_err() || *cancel.borrow() {
                                return Err(RetryError::Cancelled);
                            }
                        }
                    }
                }
                last_error = Some(e);
            }
        }
    }

    Err(RetryError::Exhausted {
        error: last_error.expect("at least one attempt ran"),
        attempts: config.max_attempts,
    })
}
