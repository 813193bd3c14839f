//! Traits that let domain types participate in retry decisions.

use std::error::Error;
use std::time::Duration;

use crate::core::error::ResilienceError;

/// Trait for errors that support retry logic.
///
/// Domain errors implement this to tell the retry loop whether another
/// attempt makes sense and whether the error carries its own delay hint
/// (e.g. a `Retry-After` header).
///
/// # Examples
///
/// ```
/// use armature_resilience::Retryable;
/// use thiserror::Error;
///
/// #[derive(Error, Debug)]
/// pub enum DatabaseError {
///     #[error("connection timeout")]
///     Timeout,
///
///     #[error("invalid query")]
///     InvalidQuery,
/// }
///
/// impl Retryable for DatabaseError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Timeout)
///     }
/// }
/// ```
pub trait Retryable: Error {
    /// Whether this error can be retried.
    ///
    /// Default: `true`.
    fn is_retryable(&self) -> bool {
        true
    }

    /// Explicit delay hint overriding the computed backoff, if any.
    ///
    /// Default: `None` (use the policy's backoff schedule).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ResilienceError {
    fn is_retryable(&self) -> bool {
        ResilienceError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        ResilienceError::retry_after(self)
    }
}

/// `std::io::Error` is retryable for transient kinds.
impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::{
            ConnectionAborted, ConnectionReset, Interrupted, TimedOut, WouldBlock,
        };
        matches!(
            self.kind(),
            Interrupted | WouldBlock | TimedOut | ConnectionReset | ConnectionAborted
        )
    }
}

/// Trait for success values that structurally expose a status code.
///
/// Some upstreams report failure inside an otherwise-successful response.
/// The retry loop consults this to treat such responses as retryable
/// soft-failures without forcing callers to convert them into errors.
pub trait StatusCoded {
    /// The status code carried by this value, if any.
    fn status_code(&self) -> Option<u16>;
}
