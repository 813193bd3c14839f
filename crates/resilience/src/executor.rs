//! Composition of retry and circuit breaking per (service, operation).
//!
//! The executor owns one circuit breaker per [`OperationKey`], created
//! lazily and kept for the life of the executor. The breaker is consulted
//! before every attempt, so a circuit that opens mid-retry aborts the loop
//! instead of hammering a known-bad upstream.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::core::config::ConfigResult;
use crate::core::error::{ErrorContext, ResilienceResult};
use crate::patterns::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::patterns::retry::RetryConfig;
use crate::retryable::StatusCoded;

/// Identifies one guarded operation of one service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub service: String,
    pub operation: String,
}

impl OperationKey {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.operation)
    }
}

/// Builder for [`ResilienceExecutor`].
#[derive(Debug, Default)]
pub struct ResilienceExecutorBuilder {
    retry: Option<RetryConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
}

impl ResilienceExecutorBuilder {
    /// Retry configuration; defaults apply when omitted.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Enable circuit breaking with the given per-key configuration.
    /// Omitting this builds an executor that retries without breakers.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Validate both configurations and build the executor.
    pub fn build(self) -> ConfigResult<ResilienceExecutor> {
        let retry = self.retry.unwrap_or_default();
        retry.validate()?;
        if let Some(config) = &self.circuit_breaker {
            config.validate()?;
        }
        Ok(ResilienceExecutor {
            retry,
            circuit_breaker: self.circuit_breaker,
            breakers: RwLock::new(HashMap::new()),
        })
    }
}

/// Retry loop plus per-key circuit breakers.
#[derive(Debug)]
pub struct ResilienceExecutor {
    retry: RetryConfig,
    circuit_breaker: Option<CircuitBreakerConfig>,
    breakers: RwLock<HashMap<OperationKey, Arc<CircuitBreaker>>>,
}

impl ResilienceExecutor {
    /// Start building an executor.
    #[must_use]
    pub fn builder() -> ResilienceExecutorBuilder {
        ResilienceExecutorBuilder::default()
    }

    /// Default retry config and default circuit breaking.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The retry configuration shared by all keys.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// State of the breaker for `key`, if one has been created.
    #[must_use]
    pub fn breaker_state(&self, key: &OperationKey) -> Option<CircuitState> {
        self.breakers.read().get(key).map(|b| b.state())
    }

    /// Run `operation` under the retry policy and the breaker for `key`.
    ///
    /// The breaker is acquired before every attempt; an open circuit ends
    /// the loop immediately with `CircuitBreakerOpen` and the operation is
    /// not invoked. Each attempt's outcome is recorded on the breaker, and
    /// each failed attempt is logged with an [`ErrorContext`].
    pub async fn execute<T, F, Fut>(&self, key: &OperationKey, mut operation: F) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        let breaker = self.breaker_for(key);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(breaker) = &breaker {
                breaker.try_acquire()?;
            }
            match operation().await {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    let context = ErrorContext::new(
                        key.service.clone(),
                        key.operation.clone(),
                        attempt,
                        err.classify().severity(),
                    );
                    context.log(&err);

                    if attempt >= self.retry.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self
                        .retry
                        .jitter
                        .apply(err.retry_after().unwrap_or_else(|| self.retry.backoff(attempt)));
                    debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but also treats a success whose
    /// value reports a retryable status code as a soft-failure.
    ///
    /// Soft-failures count against the breaker like any other failure. On
    /// the last attempt a soft-failing value is returned as-is; callers
    /// inspect the status themselves.
    pub async fn execute_with_status<T, F, Fut>(
        &self,
        key: &OperationKey,
        mut operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
        T: StatusCoded,
    {
        let breaker = self.breaker_for(key);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(breaker) = &breaker {
                breaker.try_acquire()?;
            }
            match operation().await {
                Ok(value) => match value.status_code() {
                    Some(status) if self.retry.is_retryable_status(status) => {
                        if let Some(breaker) = &breaker {
                            breaker.record_failure();
                        }
                        if attempt >= self.retry.max_retries {
                            return Ok(value);
                        }
                        let delay = self.retry.jitter.apply(self.retry.backoff(attempt));
                        warn!(
                            key = %key,
                            attempt,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retryable status code, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    _ => {
                        if let Some(breaker) = &breaker {
                            breaker.record_success();
                        }
                        return Ok(value);
                    }
                },
                Err(err) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    let context = ErrorContext::new(
                        key.service.clone(),
                        key.operation.clone(),
                        attempt,
                        err.classify().severity(),
                    );
                    context.log(&err);

                    if attempt >= self.retry.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self
                        .retry
                        .jitter
                        .apply(err.retry_after().unwrap_or_else(|| self.retry.backoff(attempt)));
                    debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Breaker for `key`, created on first use.
    fn breaker_for(&self, key: &OperationKey) -> Option<Arc<CircuitBreaker>> {
        let config = self.circuit_breaker.as_ref()?;
        if let Some(existing) = self.breakers.read().get(key) {
            return Some(existing.clone());
        }
        let mut breakers = self.breakers.write();
        Some(
            breakers
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::with_config(key.to_string(), config.clone()))
                })
                .clone(),
        )
    }
}
