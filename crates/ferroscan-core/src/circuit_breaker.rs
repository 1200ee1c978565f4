//! Circuit breaker shared by every worker that calls one provider.
//!
//! While open, callers are turned away with the time left until the next
//! trial call. The retry loop parks on that wait without spending an attempt.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Runtime circuit state guarding a provider's upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive upstream failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a single trial call is let through.
    pub open_timeout: Duration,
    /// Wait handed to callers turned away while a trial call is in flight.
    pub trial_wait: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 8,
            open_timeout: Duration::from_secs(2),
            trial_wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
}

impl BreakerState {
    fn circuit(&self) -> CircuitState {
        match (self.opened_at, self.trial_started) {
            (None, _) => CircuitState::Closed,
            (Some(_), None) => CircuitState::Open,
            (Some(_), Some(_)) => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Admits one upstream call, or returns how long the caller should wait
    /// before asking again.
    ///
    /// After `open_timeout` exactly one caller is admitted as a trial call.
    /// A trial call whose outcome is never recorded (its future was dropped
    /// on a timeout) goes stale after another `open_timeout`, and a new one
    /// is admitted.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self
            .state
            .lock()
            .expect("circuit breaker lock is not poisoned");
        let Some(opened_at) = state.opened_at else {
            return Ok(());
        };

        let now = Instant::now();
        match state.trial_started {
            Some(started) if now.duration_since(started) < self.config.open_timeout => {
                Err(self.config.trial_wait)
            }
            Some(_) => {
                state.trial_started = Some(now);
                Ok(())
            }
            None => {
                let open_for = now.duration_since(opened_at);
                if open_for >= self.config.open_timeout {
                    state.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(self.config.open_timeout - open_for)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self
            .state
            .lock()
            .expect("circuit breaker lock is not poisoned");
        if state.opened_at.is_some() {
            tracing::info!("circuit breaker closed");
        }
        *state = BreakerState::default();
    }

    pub fn record_failure(&self) {
        let mut state = self
            .state
            .lock()
            .expect("circuit breaker lock is not poisoned");
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        match state.circuit() {
            CircuitState::HalfOpen => {
                state.opened_at = Some(Instant::now());
                state.trial_started = None;
            }
            CircuitState::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    failures = state.consecutive_failures,
                    open_ms = self.config.open_timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
                state.opened_at = Some(Instant::now());
            }
            // Calls admitted before the circuit opened keep the original window.
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
            .lock()
            .expect("circuit breaker lock is not poisoned")
            .circuit()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .expect("circuit breaker lock is not poisoned")
            .consecutive_failures
    }
}
