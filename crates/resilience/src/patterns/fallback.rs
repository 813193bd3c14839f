//! Ordered fallback chains.
//!
//! Alternatives are tried strictly in order; each is awaited to completion
//! before the next one starts. Every failure is logged with its position.
//! Exhaustion re-raises the last alternative's error unchanged — earlier
//! errors are discoverable only through the logs.

use std::future::Future;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::core::error::{ResilienceError, ResilienceResult};

type FallbackOperation<T> = Box<dyn Fn() -> BoxFuture<'static, ResilienceResult<T>> + Send + Sync>;

/// A named, ordered chain of alternatives producing a `T`.
pub struct FallbackChain<T> {
    operation: String,
    alternatives: Vec<FallbackOperation<T>>,
}

impl<T> std::fmt::Debug for FallbackChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("operation", &self.operation)
            .field("alternatives", &self.alternatives.len())
            .finish()
    }
}

impl<T> FallbackChain<T> {
    /// Empty chain named after the operation it guards.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            alternatives: Vec::new(),
        }
    }

    /// Append an alternative; earlier pushes are tried first.
    #[must_use]
    pub fn push<F, Fut>(mut self, alternative: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.alternatives.push(Box::new(move || Box::pin(alternative())));
        self
    }

    /// Number of alternatives in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    /// Whether the chain has no alternatives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Try each alternative in order, returning the first success.
    ///
    /// An empty chain is a configuration error
    /// ([`ResilienceError::EmptyFallbackChain`]), distinct from any
    /// operation failure.
    pub async fn execute(&self) -> ResilienceResult<T> {
        let total = self.alternatives.len();
        let mut last_error: Option<ResilienceError> = None;

        for (position, alternative) in self.alternatives.iter().enumerate() {
            match alternative().await {
                Ok(value) => {
                    debug!(
                        operation = %self.operation,
                        position,
                        "fallback alternative succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation = %self.operation,
                        position,
                        total,
                        error = %err,
                        "fallback alternative failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(
            last_error.unwrap_or_else(|| ResilienceError::EmptyFallbackChain {
                operation: self.operation.clone(),
            }),
        )
    }
}

type BlockingFallbackOperation<T> = Box<dyn Fn() -> ResilienceResult<T> + Send + Sync>;

/// Blocking counterpart of [`FallbackChain`] for non-async call sites.
///
/// Same semantics: strict order, every failure logged with its position,
/// exhaustion re-raises the last error, empty chain is a configuration
/// error.
pub struct BlockingFallbackChain<T> {
    operation: String,
    alternatives: Vec<BlockingFallbackOperation<T>>,
}

impl<T> std::fmt::Debug for BlockingFallbackChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingFallbackChain")
            .field("operation", &self.operation)
            .field("alternatives", &self.alternatives.len())
            .finish()
    }
}

impl<T> BlockingFallbackChain<T> {
    /// Empty chain named after the operation it guards.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            alternatives: Vec::new(),
        }
    }

    /// Append an alternative; earlier pushes are tried first.
    #[must_use]
    pub fn push<F>(mut self, alternative: F) -> Self
    where
        F: Fn() -> ResilienceResult<T> + Send + Sync + 'static,
    {
        self.alternatives.push(Box::new(alternative));
        self
    }

    /// Number of alternatives in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    /// Whether the chain has no alternatives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Try each alternative in order, returning the first success.
    pub fn execute(&self) -> ResilienceResult<T> {
        let total = self.alternatives.len();
        let mut last_error: Option<ResilienceError> = None;

        for (position, alternative) in self.alternatives.iter().enumerate() {
            match alternative() {
                Ok(value) => {
                    debug!(
                        operation = %self.operation,
                        position,
                        "fallback alternative succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation = %self.operation,
                        position,
                        total,
                        error = %err,
                        "fallback alternative failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(
            last_error.unwrap_or_else(|| ResilienceError::EmptyFallbackChain {
                operation: self.operation.clone(),
            }),
        )
    }
}
