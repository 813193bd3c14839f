//! Constructor injection contract.
//!
//! Services declare their dependencies up front so the container can
//! validate the registration graph without constructing anything, and
//! implement [`Injectable::construct`] to build themselves from a
//! [`Resolver`].

use std::any::{type_name, TypeId};

use crate::container::Resolver;
use crate::error::ResolutionError;

/// How a declared dependency behaves when it cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Must resolve; failure fails the whole construction.
    Required,
    /// Absent on failure (`Resolver::get_optional`).
    Optional,
    /// Falls back to a default value on failure (`Resolver::get_or`).
    Defaulted,
}

/// One declared dependency of an [`Injectable`] service.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub(crate) id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) kind: DependencyKind,
}

impl Dependency {
    /// A dependency that must resolve.
    #[must_use]
    pub fn required<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind: DependencyKind::Required,
        }
    }

    /// A dependency the service can do without.
    #[must_use]
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind: DependencyKind::Optional,
        }
    }

    /// A dependency with a local default when unregistered.
    #[must_use]
    pub fn defaulted<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind: DependencyKind::Defaulted,
        }
    }

    /// The dependency's type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// How the dependency behaves when unresolvable.
    #[must_use]
    pub fn kind(&self) -> DependencyKind {
        self.kind
    }
}

/// Services constructed by the container implement this trait.
///
/// `dependencies` powers construction-free validation; `construct` performs
/// the actual injection via the resolver. The two must agree: resolve in
/// `construct` exactly what `dependencies` declares.
///
/// # Examples
///
/// ```
/// use armature_container::{
///     Dependency, Injectable, Resolver, ResolutionError, ServiceContainer,
/// };
/// use std::sync::Arc;
///
/// struct Config {
///     url: String,
/// }
///
/// struct Client {
///     config: Arc<Config>,
/// }
///
/// impl Injectable for Client {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::required::<Config>()]
///     }
///
///     fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
///         Ok(Self {
///             config: resolver.get::<Config>()?,
///         })
///     }
/// }
///
/// let mut container = ServiceContainer::new();
/// container
///     .register_instance(Config { url: "https://example.test".into() })
///     .register_singleton::<Client>();
///
/// let client = container.resolve::<Client>().unwrap();
/// assert_eq!(client.config.url, "https://example.test");
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Dependencies this service declares, in constructor order.
    ///
    /// Default: none.
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Build the service, resolving dependencies through `resolver`.
    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError>;
}
