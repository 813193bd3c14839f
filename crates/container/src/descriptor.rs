//! Service descriptors: what is registered and how it materializes.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::container::Resolver;
use crate::error::ResolutionError;
use crate::injectable::Dependency;

/// Type-erased service payload.
///
/// Holds an `Arc<S>` boxed behind `Any`, so `S` may be unsized (trait
/// objects included); downcasting recovers the inner `Arc<S>`.
pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

pub(crate) type ProviderFn = Arc<
    dyn for<'a, 'b> Fn(&'a mut Resolver<'b>) -> Result<AnyService, ResolutionError>
        + Send
        + Sync,
>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance per container, created on first resolution and cached.
    Singleton,
    /// A fresh instance on every resolution.
    Transient,
    /// One instance per [`Scope`](crate::scope::Scope), cached in the scope.
    Scoped,
}

/// Exactly one way to materialize a service.
pub(crate) enum Provider {
    /// A pre-built value; every resolution returns the same payload.
    Instance(AnyService),
    /// A resolver-taking factory; constructor injection funnels through here.
    Factory(ProviderFn),
}

/// One registration: service key, implementation, lifetime, provider and the
/// dependencies declared for validation.
pub struct ServiceDescriptor {
    pub(crate) service_id: TypeId,
    pub(crate) service_name: &'static str,
    pub(crate) implementation_name: &'static str,
    pub(crate) lifetime: Lifetime,
    pub(crate) provider: Provider,
    pub(crate) dependencies: Vec<Dependency>,
}

impl ServiceDescriptor {
    /// The registered service type's name.
    #[must_use]
    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    /// The implementing type's name (equal to the service for
    /// self-registrations).
    #[must_use]
    pub fn implementation_name(&self) -> &'static str {
        self.implementation_name
    }

    /// The registered lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Dependencies declared by the implementation.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service", &self.service_name)
            .field("implementation", &self.implementation_name)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}
