//! Circuit breaker guarding a single named operation.
//!
//! Stops calling a dependency that keeps failing, then probes it again after a
//! cooldown. All transitions happen under one lock, so concurrent callers that
//! fail at the same moment cannot open the breaker twice or miss a transition.

use configuration::CircuitBreakerConfig;
use core_types::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// Calls are let through to test whether the dependency recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    open_until: Option<Instant>,
    times_opened: u64,
}

/// Read-only view of a breaker for diagnostics and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub operation: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Time left until an open breaker admits a probe.
    pub retry_in: Option<Duration>,
    pub times_opened: u64,
}

pub struct CircuitBreaker {
    operation: String,
    failure_threshold: u32,
    success_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            operation: operation.into(),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                open_until: None,
                times_opened: 0,
            }),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Asks permission for one call.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and admits
    /// the call. Otherwise an open breaker answers with the remaining cooldown.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let now = self.clock.now();
        match inner.open_until {
            Some(until) if now < until => Err(until - now),
            _ => {
                info!(operation = %self.operation, "Circuit breaker half-open; probing dependency.");
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                Ok(())
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    info!(
                        operation = %self.operation,
                        successes = inner.consecutive_successes,
                        "Circuit breaker closed after successful probes."
                    );
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.open_until = None;
                }
            }
            // A call admitted before the breaker opened finished late.
            CircuitState::Open => {
                debug!(operation = %self.operation, "Success recorded while circuit open.");
            }
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        operation = %self.operation,
                        failures = inner.consecutive_failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Circuit breaker opened after consecutive failures."
                    );
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                warn!(operation = %self.operation, "Circuit breaker re-opened after failed probe.");
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    /// A non-retryable failure. It says nothing about the dependency while the
    /// breaker is closed, but any failure while half-open re-opens it.
    pub async fn record_fatal(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_failures += 1;
            warn!(operation = %self.operation, "Circuit breaker re-opened after a fatal error while half-open.");
            self.open(&mut inner);
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        let now = self.clock.now();
        BreakerSnapshot {
            operation: self.operation.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            retry_in: match (inner.state, inner.open_until) {
                (CircuitState::Open, Some(until)) => Some(until.saturating_duration_since(now)),
                _ => None,
            },
            times_opened: inner.times_opened,
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.consecutive_successes = 0;
        inner.open_until = Some(self.clock.now() + self.cooldown);
        inner.times_opened += 1;
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}
