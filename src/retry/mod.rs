use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::acquire::AttemptOutcome;
use crate::utils::jitter;

/// Bounded retries with jittered exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Growth of the delay per retry; 1.0 keeps it flat
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub const JITTER_LOW: f64 = 0.5;
    pub const JITTER_HIGH: f64 = 1.5;

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor: 2.0,
        }
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    /// Delay before retry number `retry` (1-based), before jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as i32;
        self.base_delay.mul_f64(self.backoff_factor.powi(exponent))
    }

    /// Run `operation` until it succeeds, fails terminally or runs out of attempts.
    ///
    /// Errors for which `is_retryable` is false end the run at once as a terminal failure.
    /// Running out of attempts yields a retryable failure carrying the last error.
    pub async fn run<T, E, F, Fut, P>(&self, operation_name: &str, mut operation: F, is_retryable: P) -> AttemptOutcome<T>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis() as u64,
                            "Operation succeeded after retry"
                        );
                    }
                    return AttemptOutcome::Success(value);
                }
                Err(err) if !is_retryable(&err) => {
                    tracing::debug!(operation = operation_name, attempt, error = %err, "Terminal failure, not retrying");
                    return AttemptOutcome::TerminalFailure(err.to_string());
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Giving up after max attempts"
                    );
                    return AttemptOutcome::RetryableFailure(format!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, err
                    ));
                }
                Err(err) => {
                    let delay = jitter(self.delay_for(attempt), Self::JITTER_LOW, Self::JITTER_HIGH);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}
