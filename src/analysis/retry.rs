//! Bounded retry with exponential backoff for provider calls.

use super::progress::{ProgressEvent, ProgressReporter};
use crate::config::RetrySettings;
use crate::error::{Result, VidlensError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How provider calls are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles after each further failure.
    pub initial_delay: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
    /// Treat per-attempt timeouts like overload errors.
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            initial_delay: settings.initial_delay(),
            attempt_timeout: settings.attempt_timeout(),
            retry_on_timeout: settings.retry_on_timeout,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    fn should_retry(&self, error: &VidlensError) -> bool {
        error.is_retryable() || (self.retry_on_timeout && error.is_timeout())
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. Each retry is announced as a status event.
    pub async fn run<T, F, Fut>(
        &self,
        reporter: &dyn ProgressReporter,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(VidlensError::ProviderTimeout(format!(
                    "no response within {}",
                    format_delay(self.attempt_timeout)
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && self.should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.max_attempts, e, delay
                    );
                    let reason = if e.is_timeout() {
                        "AI model did not respond in time"
                    } else {
                        "AI model is overloaded"
                    };
                    reporter
                        .send(ProgressEvent::status(format!(
                            "{}. Retrying in {} (attempt {}/{})...",
                            reason,
                            format_delay(delay),
                            attempt + 1,
                            self.max_attempts
                        )))
                        .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if self.should_retry(&e) {
                        warn!("Giving up after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}
