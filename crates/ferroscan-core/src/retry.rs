//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use crate::source::SourceError;
use crate::throttle::RequestThrottle;

/// Backoff strategy between attempts of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^retry`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Applies +/- 50% random jitter to the capped delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(250),
            factor: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(retry.min(i32::MAX as u32) as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds.max(0.0));
                if !jitter {
                    return delay;
                }

                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let offset = fastrand::u64(0..=(jitter_ms * 2));
                let total_ms = delay.as_millis() as i64 + (offset as i64 - jitter_ms as i64);
                Duration::from_millis(total_ms.max(0) as u64)
            }
        }
    }
}

/// Bounded retry policy; total attempts = `max_retries + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Total time one unit of work may park on open-circuit rejections.
    /// Rejections inside this budget are not attempts; past it they count.
    pub max_circuit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff: Backoff::default(),
            max_circuit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Final error of a unit of work after its retry budget was spent.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub attempts: u32,
    pub error: SourceError,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `config`.
///
/// Each attempt waits on `throttle` (when set) and is bounded by
/// `attempt_timeout`; an elapsed timeout counts as a retryable failure. An
/// error carrying a `retry_after` never reached the provider: the loop sleeps
/// for that long without counting an attempt, until `max_circuit_wait` is used
/// up.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    attempt_timeout: Duration,
    throttle: Option<&RequestThrottle>,
    mut operation: F,
) -> Result<T, TaskFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0;
    let mut circuit_wait = Duration::ZERO;
    loop {
        if let Some(throttle) = throttle {
            throttle.wait().await;
        }

        let error = match tokio::time::timeout(attempt_timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => SourceError::timeout(format!(
                "attempt exceeded {} ms",
                attempt_timeout.as_millis()
            )),
        };

        if let Some(wait) = error.retry_after() {
            if circuit_wait + wait <= config.max_circuit_wait {
                circuit_wait += wait;
                tracing::trace!(wait_ms = wait.as_millis() as u64, code = error.code(), "parked on open circuit");
                tokio::time::sleep(wait).await;
                continue;
            }
        }

        attempt += 1;
        if !error.retryable() || attempt >= max_attempts {
            return Err(TaskFailure {
                attempts: attempt,
                error,
            });
        }

        let delay = config.delay_for_attempt(attempt - 1);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            code = error.code(),
            "retrying after failure"
        );
        tokio::time::sleep(delay).await;
    }
}
