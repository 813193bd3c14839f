//! Resilience patterns for calling unreliable upstreams.
//!
//! Three composable patterns plus an executor that wires them together:
//!
//! - [`RetryPolicy`] — capped exponential backoff with optional jitter,
//!   status-code soft-failure handling, blocking and cancellation-aware
//!   variants. Exhaustion re-raises the last error unchanged.
//! - [`CircuitBreaker`] — closed/open/half-open state machine with lazy
//!   recovery; open circuits reject calls without invoking the operation.
//! - [`FallbackChain`] — ordered alternatives tried strictly in sequence.
//! - [`ResilienceExecutor`] — retry plus one lazily-created breaker per
//!   `(service, operation)` key, with the breaker consulted before every
//!   attempt.
//!
//! # Quick start
//!
//! ```
//! use armature_resilience::{OperationKey, ResilienceExecutor, ResilienceResult};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> ResilienceResult<()> {
//!     let executor = ResilienceExecutor::with_defaults();
//!     let key = OperationKey::new("search", "query");
//!
//!     let hits = executor.execute(&key, || async { Ok(vec!["result"]) }).await?;
//!     assert_eq!(hits, vec!["result"]);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod executor;
pub mod patterns;
pub mod retryable;

pub use self::core::config::{ConfigError, ConfigResult};
pub use self::core::error::{ErrorClass, ErrorContext, ResilienceError, ResilienceResult, Severity};
pub use executor::{OperationKey, ResilienceExecutor, ResilienceExecutorBuilder};
pub use patterns::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use patterns::fallback::{BlockingFallbackChain, FallbackChain};
pub use patterns::retry::{
    with_retry, with_retry_blocking, Jitter, RetryConfig, RetryPolicy,
    DEFAULT_RETRYABLE_STATUS_CODES,
};
pub use retryable::{Retryable, StatusCoded};

/// Commonly used items.
pub mod prelude {
    pub use crate::core::error::{ResilienceError, ResilienceResult};
    pub use crate::executor::{OperationKey, ResilienceExecutor};
    pub use crate::patterns::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::patterns::fallback::{BlockingFallbackChain, FallbackChain};
    pub use crate::patterns::retry::{RetryConfig, RetryPolicy};
    pub use crate::retryable::{Retryable, StatusCoded};
}
