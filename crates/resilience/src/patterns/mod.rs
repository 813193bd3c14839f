//! Resilience patterns: retry, circuit breaker, fallback.

pub mod circuit_breaker;
pub mod fallback;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use fallback::{BlockingFallbackChain, FallbackChain};
pub use retry::{with_retry, with_retry_blocking, Jitter, RetryConfig, RetryPolicy};
