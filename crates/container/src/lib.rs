//! Service container with constructor injection, lifetimes and scopes.
//!
//! Services are registered against their type with a [`Lifetime`]
//! (singleton, transient or scoped) and materialize either from a pre-built
//! instance, a factory, or their [`Injectable`] implementation. Resolution
//! detects dependency cycles immediately and never retries;
//! [`ServiceContainer::validate_registrations`] checks the whole graph
//! without constructing anything.
//!
//! # Quick start
//!
//! ```
//! use armature_container::{Dependency, Injectable, Resolver, ResolutionError, ServiceContainer};
//! use std::sync::Arc;
//!
//! struct Config {
//!     dsn: String,
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::required::<Config>()]
//!     }
//!
//!     fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
//!         Ok(Self { config: resolver.get::<Config>()? })
//!     }
//! }
//!
//! let mut container = ServiceContainer::new();
//! container
//!     .register_instance(Config { dsn: "db://localhost".into() })
//!     .register_singleton::<Database>();
//!
//! container.validate_registrations().unwrap();
//! let database = container.resolve::<Database>().unwrap();
//! assert_eq!(database.config.dsn, "db://localhost");
//! ```

pub mod container;
pub mod descriptor;
pub mod error;
pub mod injectable;
pub mod scope;

pub use container::{Resolver, ServiceContainer};
pub use descriptor::{Lifetime, ServiceDescriptor};
pub use error::{RegistrationError, ResolutionError};
pub use injectable::{Dependency, DependencyKind, Injectable};
pub use scope::Scope;

/// Commonly used items.
pub mod prelude {
    pub use crate::container::{Resolver, ServiceContainer};
    pub use crate::descriptor::Lifetime;
    pub use crate::error::{RegistrationError, ResolutionError};
    pub use crate::injectable::{Dependency, DependencyKind, Injectable};
    pub use crate::scope::Scope;
}
