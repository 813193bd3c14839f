//! Error taxonomy for resilience operations.
//!
//! Every failure mode a guarded operation can surface is a variant of
//! [`ResilienceError`]. Classification ([`ErrorClass`]) drives retry
//! decisions; [`ErrorContext`] is a diagnostic record that is logged and
//! never drives control flow.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, warn};

/// Result alias for resilience operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Errors surfaced by guarded operations and by the patterns themselves.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The upstream service signalled rate limiting.
    #[error("rate limit exceeded")]
    RateLimit {
        /// Server-provided hint for when to retry, if any.
        retry_after: Option<Duration>,
    },

    /// An API call completed with a failure status.
    #[error("API call failed with status {status}: {message}")]
    Api {
        /// HTTP-ish status code reported by the upstream.
        status: u16,
        /// Upstream-provided failure message.
        message: String,
    },

    /// A connection could not be established or was lost.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation exceeded its time budget.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The circuit breaker guarding the operation is open; the operation was
    /// not invoked.
    #[error("circuit breaker is open for '{operation}'")]
    CircuitBreakerOpen {
        operation: String,
        /// Time remaining until the breaker admits a probe call.
        retry_after: Option<Duration>,
    },

    /// A fallback chain was executed with no operations configured.
    #[error("fallback chain for '{operation}' has no operations configured")]
    EmptyFallbackChain { operation: String },

    /// The caller cancelled the operation.
    #[error("operation was cancelled")]
    Cancelled {
        /// Optional detail about where cancellation was observed.
        reason: Option<String>,
    },
}

impl ResilienceError {
    /// Rate-limit error with an optional server retry hint.
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    /// API failure with a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Connection failure without an underlying cause.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Connection failure wrapping an underlying cause.
    pub fn connection_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Timeout after the given duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Cancellation observed at the given point.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: Some(reason.into()),
        }
    }

    /// Classify this error for retry decisions.
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => ErrorClass::Transient,
            Self::Api { status, .. } => {
                if matches!(status, 408 | 429 | 500 | 502 | 503 | 504) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Self::RateLimit { .. } | Self::CircuitBreakerOpen { .. } => {
                ErrorClass::ResourceExhaustion
            }
            Self::EmptyFallbackChain { .. } => ErrorClass::Configuration,
            Self::Cancelled { .. } => ErrorClass::Permanent,
        }
    }

    /// Whether a retry loop may attempt this operation again.
    ///
    /// Breaker rejections are never retryable: retrying into an open circuit
    /// would defeat the cooldown.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if matches!(self, Self::CircuitBreakerOpen { .. }) {
            return false;
        }
        matches!(
            self.classify(),
            ErrorClass::Transient | ErrorClass::ResourceExhaustion
        )
    }

    /// Whether this error ends the operation for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Explicit delay hint carried by the error, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } | Self::CircuitBreakerOpen { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

/// Coarse classification of a resilience error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to succeed on retry (connection drops, timeouts, 5xx).
    Transient,
    /// Backpressure from the upstream (rate limits, open breakers).
    ResourceExhaustion,
    /// Misconfiguration; no amount of retrying helps.
    Configuration,
    /// Definitive failure (4xx other than 408/429, cancellation).
    Permanent,
}

impl ErrorClass {
    /// Log severity appropriate for this class.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Transient | Self::ResourceExhaustion => Severity::Warning,
            Self::Permanent => Severity::Error,
            Self::Configuration => Severity::Critical,
        }
    }
}

/// Log severity attached to an [`ErrorContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Diagnostic record for one failed attempt.
///
/// Purely observational: built by the executor per failed attempt and handed
/// to [`ErrorContext::log`]. Nothing reads it back.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub service: String,
    pub operation: String,
    pub attempt: u32,
    pub severity: Severity,
    pub timestamp: Instant,
}

impl ErrorContext {
    /// Context for one attempt of `service`/`operation`, stamped now.
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        attempt: u32,
        severity: Severity,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            attempt,
            severity,
            timestamp: Instant::now(),
        }
    }

    /// Emit this context with the failing error at its severity.
    pub fn log(&self, err: &ResilienceError) {
        match self.severity {
            Severity::Warning => warn!(
                service = %self.service,
                operation = %self.operation,
                attempt = self.attempt,
                error = %err,
                "operation attempt failed"
            ),
            Severity::Error | Severity::Critical => error!(
                service = %self.service,
                operation = %self.operation,
                attempt = self.attempt,
                error = %err,
                "operation attempt failed"
            ),
        }
    }
}
