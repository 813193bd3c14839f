//! Retry with capped exponential backoff.
//!
//! The schedule is `min(initial_delay * backoff_factor^(attempt-1), max_delay)`
//! with optional jitter applied after the cap. Exhaustion re-raises the last
//! error unchanged; there is no wrapper error and no silent default value.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::{ConfigError, ConfigResult};
use crate::core::error::{ResilienceError, ResilienceResult};
use crate::retryable::{Retryable, StatusCoded};

/// Status codes treated as retryable soft-failures by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Jitter applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// No jitter; the documented schedule is exact.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl Jitter {
    /// Apply this jitter to a capped delay.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(fastrand::u64(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + fastrand::u64(0..=half))
                }
            }
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt budget, including the first call. Must be at least 1.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per attempt. Must be at least 1.0.
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Jitter applied after the cap.
    pub jitter: Jitter,
    /// Status codes treated as retryable soft-failures by
    /// [`RetryPolicy::execute_with_status`].
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: Jitter::None,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryConfig {
    /// Validate this configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::validation("max_retries must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::validation(
                "initial_delay must be greater than zero",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::validation(
                "backoff_factor must be a finite value of at least 1.0",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::validation(
                "max_delay must be at least initial_delay",
            ));
        }
        Ok(())
    }

    /// Delay before the attempt following `attempt` (1-indexed), before
    /// jitter: `min(initial_delay * backoff_factor^(attempt-1), max_delay)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Whether `status` is configured as a retryable soft-failure.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Executes operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy, validating the configuration.
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a policy from an already-validated configuration.
    #[must_use]
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration driving this policy.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with retries.
    ///
    /// Retryable errors sleep the backoff delay (or the error's own
    /// [`Retryable::retry_after`] hint) and try again; non-retryable errors
    /// propagate immediately; the last attempt's error is re-raised unchanged.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        warn!(attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    if !err.is_retryable() {
                        debug!(attempt, error = %err, "non-retryable error, propagating");
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt, err.retry_after());
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but also treats a success whose value
    /// reports a retryable status code as a soft-failure.
    ///
    /// On the last attempt a soft-failing value is returned as-is; callers
    /// inspect the status themselves.
    pub async fn execute_with_status<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: StatusCoded,
        E: Retryable,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => match value.status_code() {
                    Some(status)
                        if self.config.is_retryable_status(status)
                            && attempt < self.config.max_retries =>
                    {
                        let delay = self.delay_for(attempt, None);
                        warn!(
                            attempt,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retryable status code, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Ok(value),
                },
                Err(err) => {
                    if attempt >= self.config.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt, err.retry_after());
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Synchronous variant of [`execute`](Self::execute) for blocking call
    /// sites; backoff sleeps block the current thread.
    pub fn execute_blocking<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Retryable,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        warn!(attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt, err.retry_after());
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                    std::thread::sleep(delay);
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but every backoff sleep races
    /// `token`; cancellation surfaces as [`ResilienceError::Cancelled`].
    pub async fn execute_with_cancellation<T, F, Fut>(
        &self,
        mut operation: F,
        token: &CancellationToken,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            if token.is_cancelled() {
                return Err(ResilienceError::cancelled("before attempt"));
            }
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        warn!(attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt, err.retry_after());
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!(attempt, "cancelled during backoff");
                            return Err(ResilienceError::cancelled("during backoff"));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| self.config.backoff(attempt));
        self.config.jitter.apply(delay)
    }
}

/// Run `operation` with retries under `config`.
///
/// Convenience wrapper over [`RetryPolicy::execute`] for one-off call sites.
pub async fn with_retry<T, E, F, Fut>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    RetryPolicy::with_config(config).execute(operation).await
}

/// Blocking counterpart of [`with_retry`].
pub fn with_retry_blocking<T, E, F>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Retryable,
{
    RetryPolicy::with_config(config).execute_blocking(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(50),
            ..RetryConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(4), Duration::from_secs(8));
        // 2^6 = 64 > 60: capped.
        assert_eq!(config.backoff(7), Duration::from_secs(60));
        assert_eq!(config.backoff(30), Duration::from_secs(60));
    }

    #[test]
    fn backoff_is_monotonic() {
        let config = RetryConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..20 {
            let delay = config.backoff(attempt);
            assert!(delay >= previous, "attempt {attempt} regressed");
            previous = delay;
        }
    }

    #[test]
    fn jitter_full_stays_within_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            assert!(Jitter::Full.apply(delay) <= delay);
        }
    }

    #[test]
    fn jitter_equal_keeps_at_least_half() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = Jitter::Equal.apply(delay);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let config = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            backoff_factor: 0.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            max_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = RetryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_retries, config.max_retries);
        assert_eq!(back.jitter, Jitter::None);
        assert!(back.is_retryable_status(503));
        assert!(!back.is_retryable_status(404));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let policy = RetryPolicy::with_config(fast_config(3));

        let result: ResilienceResult<u32> = policy
            .execute(|| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reraises_original_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let policy = RetryPolicy::with_config(fast_config(3));

        let result: ResilienceResult<u32> = policy
            .execute(|| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::connection("refused")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ResilienceError::Connection { message, .. } => assert_eq!(message, "refused"),
            other => panic!("expected the original connection error, got {other}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let policy = RetryPolicy::with_config(fast_config(5));

        let result: ResilienceResult<u32> = policy
            .execute(|| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::api(400, "bad request")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let policy = RetryPolicy::with_config(fast_config(5));

        let result: ResilienceResult<&str> = policy
            .execute(|| {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ResilienceError::timeout(Duration::from_millis(1)))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[derive(Debug, PartialEq)]
    struct Response {
        status: u16,
    }

    impl StatusCoded for Response {
        fn status_code(&self) -> Option<u16> {
            Some(self.status)
        }
    }

    #[tokio::test]
    async fn retryable_status_is_a_soft_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let policy = RetryPolicy::with_config(fast_config(5));

        let result: ResilienceResult<Response> = policy
            .execute_with_status(|| {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(Response { status: 503 })
                    } else {
                        Ok(Response { status: 200 })
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), Response { status: 200 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn soft_failure_on_last_attempt_returns_value() {
        let policy = RetryPolicy::with_config(fast_config(2));

        let result: ResilienceResult<Response> = policy
            .execute_with_status(|| async { Ok(Response { status: 503 }) })
            .await;

        // Exhausted: the soft-failing value comes back as-is.
        assert_eq!(result.unwrap(), Response { status: 503 });
    }

    #[test]
    fn blocking_variant_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::with_config(fast_config(3));

        let result: ResilienceResult<&str> = policy.execute_blocking(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ResilienceError::connection("flaky"))
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let mut config = fast_config(10);
        config.initial_delay = Duration::from_secs(30);
        config.max_delay = Duration::from_secs(30);
        let policy = RetryPolicy::with_config(config);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result: ResilienceResult<u32> = policy
            .execute_with_cancellation(
                || async { Err(ResilienceError::connection("down")) },
                &token,
            )
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::Cancelled { .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn with_retry_helper() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let result: ResilienceResult<u32> = with_retry(fast_config(3), || {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ResilienceError::rate_limit(Some(Duration::from_millis(5))))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
