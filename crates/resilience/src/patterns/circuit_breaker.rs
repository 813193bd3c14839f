//! Circuit breaker: fail fast once an upstream is known to be unhealthy.
//!
//! Three states. `Closed`: calls flow, consecutive failures counted. `Open`:
//! calls are rejected without invoking the operation until the recovery
//! timeout elapses. `HalfOpen`: calls flow as probes; enough consecutive
//! successes close the circuit, any failure reopens it. Recovery is lazy —
//! the open→half-open transition happens on the next acquisition after the
//! timeout, not on a background timer.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::{ConfigError, ConfigResult};
use crate::core::error::{ResilienceError, ResilienceResult};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Failing fast; calls are rejected without invoking the operation.
    Open,
    /// Probing recovery; limited consecutive successes close the circuit.
    HalfOpen,
}

impl CircuitState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub recovery_timeout: Duration,
    /// Consecutive successes in `HalfOpen` that close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate this configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::validation(
                "failure_threshold must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::validation(
                "success_threshold must be at least 1",
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::validation(
                "recovery_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Mutable breaker state; every transition happens under this lock.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

/// Point-in-time snapshot of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// A named circuit breaker.
///
/// Shared freely behind `Arc`; the inner lock is a sync `parking_lot::Mutex`
/// held only for counter updates, so the breaker works from both async and
/// blocking call sites.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    // Mirror of `inner.state` so `state()` never takes the lock.
    atomic_state: AtomicU8,
}

impl CircuitBreaker {
    /// Create a breaker, validating the configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::with_config(name, config))
    }

    /// Create a breaker from an already-validated configuration.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
            }),
            atomic_state: AtomicU8::new(CircuitState::Closed.as_u8()),
        }
    }

    /// Create a breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// The breaker's name, used in rejection errors and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, lock-free.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.atomic_state.load(Ordering::Acquire))
    }

    /// Check whether a call may proceed.
    ///
    /// In `Open`, performs the lazy transition to `HalfOpen` once the
    /// recovery timeout has elapsed; otherwise rejects with
    /// [`ResilienceError::CircuitBreakerOpen`] carrying the remaining wait.
    pub fn try_acquire(&self) -> ResilienceResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.consecutive_successes = 0;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitBreakerOpen {
                        operation: self.name.clone(),
                        retry_after: Some(self.config.recovery_timeout - elapsed),
                    })
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.last_failure_at = None;
                }
            }
            // A success racing the open window; the next acquisition decides.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // One failed probe is enough to reopen.
                inner.consecutive_failures += 1;
                inner.consecutive_successes = 0;
                inner.last_failure_at = Some(Instant::now());
                warn!(breaker = %self.name, "probe failed, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
                debug!(breaker = %self.name, "failure recorded while open");
            }
        }
    }

    /// Run `operation` under this breaker: acquire, invoke, record.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Snapshot of the breaker's counters and state.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
        }
    }

    /// Force the breaker back to `Closed` with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.last_failure_at = None;
    }

    /// Move to `next`, keeping the atomic mirror in sync.
    fn transition(&self, inner: &mut BreakerInner, next: CircuitState) {
        if inner.state == next {
            return;
        }
        info!(breaker = %self.name, from = %inner.state, to = %next, "circuit state transition");
        inner.state = next;
        self.atomic_state.store(next.as_u8(), Ordering::Release);
    }
}
