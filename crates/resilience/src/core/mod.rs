//! Core types shared by every resilience pattern.

pub mod config;
pub mod error;

pub use self::config::{ConfigError, ConfigResult};
pub use self::error::{ErrorClass, ErrorContext, ResilienceError, ResilienceResult, Severity};
