//! Container error taxonomy.
//!
//! Two families: [`RegistrationError`] for configuration-time problems found
//! by `validate_registrations`, and [`ResolutionError`] for failures while
//! materializing a service. Both are fatal — the container never retries.

use thiserror::Error;

/// Configuration-time registration problems.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A registered service requires a dependency that no descriptor covers.
    #[error("service '{service}' requires '{dependency}', which is not registered")]
    MissingDependency {
        service: &'static str,
        dependency: &'static str,
    },

    /// A service lists itself as a required dependency.
    #[error("service '{service}' lists itself as a required dependency")]
    SelfDependency { service: &'static str },
}

/// Failures while resolving a service.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No descriptor is registered for the requested type.
    #[error("service '{type_name}' is not registered")]
    NotRegistered { type_name: &'static str },

    /// The dependency graph loops back on itself.
    #[error("circular dependency detected while resolving '{type_name}' ({chain})")]
    CircularDependency {
        type_name: &'static str,
        /// The resolution chain, e.g. `A -> B -> A`.
        chain: String,
    },

    /// A constructor or factory failed.
    #[error("failed to construct '{type_name}': {reason}")]
    Construction {
        type_name: &'static str,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A scoped service was resolved through the root container.
    #[error("scoped service '{type_name}' resolved outside of a scope")]
    ScopedOutsideScope { type_name: &'static str },
}

impl ResolutionError {
    /// Construction failure without an underlying cause.
    pub fn construction<S: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::Construction {
            type_name: std::any::type_name::<S>(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Construction failure wrapping an underlying cause.
    pub fn construction_with<S: ?Sized + 'static>(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Construction {
            type_name: std::any::type_name::<S>(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The service type the failure is about.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NotRegistered { type_name }
            | Self::CircularDependency { type_name, .. }
            | Self::Construction { type_name, .. }
            | Self::ScopedOutsideScope { type_name } => type_name,
        }
    }
}
