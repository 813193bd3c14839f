//! Configuration validation error shared by the pattern configs.

use thiserror::Error;

/// Result alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A pattern configuration failed validation.
///
/// Raised by `RetryConfig::validate`, `CircuitBreakerConfig::validate` and the
/// executor builder. Configuration errors are fatal and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Create a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The validation message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
