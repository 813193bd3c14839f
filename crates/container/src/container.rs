//! The service container: registry, singleton cache and resolution.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::descriptor::{AnyService, Lifetime, Provider, ProviderFn, ServiceDescriptor};
use crate::error::{RegistrationError, ResolutionError};
use crate::injectable::{DependencyKind, Injectable};
use crate::scope::Scope;

/// Registry of service descriptors plus the singleton cache.
///
/// Registration happens during a single-threaded configuration phase
/// (`&mut self`); resolution is `&self` and safe to share afterwards.
#[derive(Default)]
pub struct ServiceContainer {
    registry: HashMap<TypeId, ServiceDescriptor>,
    singletons: Mutex<HashMap<TypeId, AnyService>>,
}

impl ServiceContainer {
    /// An empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `S` as a singleton constructed from its own `Injectable`
    /// implementation.
    pub fn register_singleton<S: Injectable>(&mut self) -> &mut Self {
        self.register_constructed::<S, S>(Lifetime::Singleton, |s| s)
    }

    /// Register `S` as a transient constructed from its own `Injectable`
    /// implementation.
    pub fn register_transient<S: Injectable>(&mut self) -> &mut Self {
        self.register_constructed::<S, S>(Lifetime::Transient, |s| s)
    }

    /// Register `S` as scoped, constructed from its own `Injectable`
    /// implementation. Resolvable only through a [`Scope`].
    pub fn register_scoped<S: Injectable>(&mut self) -> &mut Self {
        self.register_constructed::<S, S>(Lifetime::Scoped, |s| s)
    }

    /// Register service `S` implemented by `I` as a singleton.
    ///
    /// `coerce` lifts the built implementation into the service type,
    /// typically an unsizing coercion: `|imp| imp as Arc<dyn Service>`.
    pub fn register_singleton_as<S, I>(&mut self, coerce: fn(Arc<I>) -> Arc<S>) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable,
    {
        self.register_constructed::<S, I>(Lifetime::Singleton, coerce)
    }

    /// Register service `S` implemented by `I` as a transient.
    pub fn register_transient_as<S, I>(&mut self, coerce: fn(Arc<I>) -> Arc<S>) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable,
    {
        self.register_constructed::<S, I>(Lifetime::Transient, coerce)
    }

    /// Register service `S` implemented by `I` as scoped.
    pub fn register_scoped_as<S, I>(&mut self, coerce: fn(Arc<I>) -> Arc<S>) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable,
    {
        self.register_constructed::<S, I>(Lifetime::Scoped, coerce)
    }

    /// Register a pre-built instance. Every resolution returns the same
    /// `Arc`.
    pub fn register_instance<S: Send + Sync + 'static>(&mut self, value: S) -> &mut Self {
        self.insert(ServiceDescriptor {
            service_id: TypeId::of::<S>(),
            service_name: type_name::<S>(),
            implementation_name: type_name::<S>(),
            lifetime: Lifetime::Singleton,
            provider: Provider::Instance(erase(Arc::new(value))),
            dependencies: Vec::new(),
        })
    }

    /// Register a factory for `S` with the given lifetime.
    ///
    /// The factory receives a [`Resolver`] and may resolve other services;
    /// its dependencies are opaque, so `validate_registrations` cannot
    /// inspect them.
    pub fn register_factory<S, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: for<'a, 'b> Fn(&'a mut Resolver<'b>) -> Result<Arc<S>, ResolutionError>
            + Send
            + Sync
            + 'static,
    {
        let provider = provider_fn(move |resolver| factory(resolver).map(erase));
        self.insert(ServiceDescriptor {
            service_id: TypeId::of::<S>(),
            service_name: type_name::<S>(),
            implementation_name: type_name::<S>(),
            lifetime,
            provider: Provider::Factory(provider),
            dependencies: Vec::new(),
        })
    }

    fn register_constructed<S, I>(
        &mut self,
        lifetime: Lifetime,
        coerce: fn(Arc<I>) -> Arc<S>,
    ) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable,
    {
        let provider = provider_fn(move |resolver| {
            let built = I::construct(resolver)?;
            Ok(erase(coerce(Arc::new(built))))
        });
        self.insert(ServiceDescriptor {
            service_id: TypeId::of::<S>(),
            service_name: type_name::<S>(),
            implementation_name: type_name::<I>(),
            lifetime,
            provider: Provider::Factory(provider),
            dependencies: I::dependencies(),
        })
    }

    /// Insert a descriptor, replacing any earlier registration for the same
    /// service type.
    fn insert(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        debug!(
            service = descriptor.service_name,
            implementation = descriptor.implementation_name,
            lifetime = ?descriptor.lifetime,
            "registering service"
        );
        self.registry.insert(descriptor.service_id, descriptor);
        self
    }

    /// Whether a descriptor exists for `S`.
    #[must_use]
    pub fn is_registered<S: ?Sized + 'static>(&self) -> bool {
        self.registry.contains_key(&TypeId::of::<S>())
    }

    /// The descriptor registered for `S`, if any.
    #[must_use]
    pub fn descriptor<S: ?Sized + 'static>(&self) -> Option<&ServiceDescriptor> {
        self.registry.get(&TypeId::of::<S>())
    }

    /// Check the registration graph without constructing anything.
    ///
    /// Fails on the first constructor-injected descriptor whose `Required`
    /// dependency is unregistered, naming both sides. Optional and defaulted
    /// dependencies may be absent. Factory registrations declare no
    /// dependencies and are skipped.
    pub fn validate_registrations(&self) -> Result<(), RegistrationError> {
        for descriptor in self.registry.values() {
            for dependency in &descriptor.dependencies {
                match dependency.kind {
                    DependencyKind::Required => {
                        if dependency.id == descriptor.service_id {
                            return Err(RegistrationError::SelfDependency {
                                service: descriptor.service_name,
                            });
                        }
                        if !self.registry.contains_key(&dependency.id) {
                            return Err(RegistrationError::MissingDependency {
                                service: descriptor.service_name,
                                dependency: dependency.type_name,
                            });
                        }
                    }
                    DependencyKind::Optional | DependencyKind::Defaulted => {}
                }
            }
        }
        Ok(())
    }

    /// Resolve `S`, constructing it (and its dependencies) as needed.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>, ResolutionError> {
        let mut stack = ResolutionStack::default();
        let erased = self.resolve_erased(TypeId::of::<S>(), type_name::<S>(), &mut stack, None)?;
        downcast_service::<S>(erased)
    }

    /// Open a scope for resolving scoped services.
    #[must_use]
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(self)
    }

    /// Tear down: clear the singleton cache. The registry survives; the next
    /// resolution rebuilds instances lazily.
    pub fn reset(&self) {
        debug!("clearing singleton cache");
        self.singletons.lock().clear();
    }

    pub(crate) fn resolve_erased(
        &self,
        id: TypeId,
        name: &'static str,
        stack: &mut ResolutionStack,
        scope: Option<&Scope<'_>>,
    ) -> Result<AnyService, ResolutionError> {
        stack.push(id, name)?;
        let result = self.resolve_pushed(id, name, stack, scope);
        stack.pop();
        result
    }

    fn resolve_pushed(
        &self,
        id: TypeId,
        name: &'static str,
        stack: &mut ResolutionStack,
        scope: Option<&Scope<'_>>,
    ) -> Result<AnyService, ResolutionError> {
        let descriptor = self
            .registry
            .get(&id)
            .ok_or(ResolutionError::NotRegistered { type_name: name })?;

        match descriptor.lifetime {
            Lifetime::Singleton => {
                if let Some(existing) = self.singletons.lock().get(&id).cloned() {
                    trace!(service = name, "singleton cache hit");
                    return Ok(existing);
                }
                // Construct outside the lock: recursive resolution of other
                // singletons would deadlock otherwise. If another thread won
                // the race, its instance is kept and ours is discarded.
                let built = self.construct(descriptor, stack, scope)?;
                Ok(self.singletons.lock().entry(id).or_insert(built).clone())
            }
            Lifetime::Scoped => {
                let Some(scope) = scope else {
                    return Err(ResolutionError::ScopedOutsideScope { type_name: name });
                };
                if let Some(existing) = scope.cached(id) {
                    trace!(service = name, "scope cache hit");
                    return Ok(existing);
                }
                let built = self.construct(descriptor, stack, Some(scope))?;
                Ok(scope.cache_or_existing(id, built))
            }
            Lifetime::Transient => self.construct(descriptor, stack, scope),
        }
    }

    fn construct(
        &self,
        descriptor: &ServiceDescriptor,
        stack: &mut ResolutionStack,
        scope: Option<&Scope<'_>>,
    ) -> Result<AnyService, ResolutionError> {
        match &descriptor.provider {
            Provider::Instance(value) => Ok(value.clone()),
            Provider::Factory(factory) => {
                trace!(
                    service = descriptor.service_name,
                    implementation = descriptor.implementation_name,
                    "constructing service"
                );
                let mut resolver = Resolver {
                    container: self,
                    stack,
                    scope,
                };
                factory(&mut resolver)
            }
        }
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("registered", &self.registry.len())
            .field("cached_singletons", &self.singletons.lock().len())
            .finish()
    }
}

/// Recover a typed `Arc<S>` from an erased service payload.
pub(crate) fn downcast_service<S: ?Sized + Send + Sync + 'static>(
    erased: AnyService,
) -> Result<Arc<S>, ResolutionError> {
    erased
        .downcast_ref::<Arc<S>>()
        .cloned()
        .ok_or_else(|| ResolutionError::construction::<S>("provider produced a different type"))
}

pub(crate) fn erase<S: ?Sized + Send + Sync + 'static>(value: Arc<S>) -> AnyService {
    Arc::new(value)
}

/// Coerce a provider closure into the erased provider type. Checking the
/// closure against the explicit higher-ranked bound keeps its signature
/// general over both resolver lifetimes.
fn provider_fn<F>(f: F) -> ProviderFn
where
    F: for<'a, 'b> Fn(&'a mut Resolver<'b>) -> Result<AnyService, ResolutionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The handle passed to [`Injectable::construct`] and factories.
///
/// Carries the active resolution stack so recursive `get` calls keep cycle
/// detection, and the active scope (if any) so scoped dependencies resolve
/// into the right cache.
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    stack: &'a mut ResolutionStack,
    scope: Option<&'a Scope<'a>>,
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("depth", &self.stack.depth())
            .field("in_scope", &self.scope.is_some())
            .finish()
    }
}

impl Resolver<'_> {
    /// Resolve a required dependency.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>, ResolutionError> {
        let erased = self.container.resolve_erased(
            TypeId::of::<T>(),
            type_name::<T>(),
            self.stack,
            self.scope,
        )?;
        downcast_service::<T>(erased)
    }

    /// Resolve an optional dependency; `None` when it cannot be resolved.
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(&mut self) -> Option<Arc<T>> {
        match self.get::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(dependency = type_name::<T>(), error = %err, "optional dependency unavailable");
                None
            }
        }
    }

    /// Resolve a dependency, falling back to `fallback` when it cannot be
    /// resolved.
    pub fn get_or<T: Send + Sync + 'static>(&mut self, fallback: impl FnOnce() -> T) -> Arc<T> {
        self.get::<T>().unwrap_or_else(|err| {
            debug!(dependency = type_name::<T>(), error = %err, "using default for dependency");
            Arc::new(fallback())
        })
    }

    /// [`get_or`](Self::get_or) with `T::default()`.
    pub fn get_or_default<T: Default + Send + Sync + 'static>(&mut self) -> Arc<T> {
        self.get_or(T::default)
    }
}

/// Types currently being resolved, for cycle detection.
///
/// Created fresh per top-level resolve; `resolve_erased` pops on every exit
/// path, so a failed resolution leaves the container usable.
#[derive(Debug, Default)]
pub(crate) struct ResolutionStack {
    frames: Vec<(TypeId, &'static str)>,
}

impl ResolutionStack {
    fn push(&mut self, id: TypeId, name: &'static str) -> Result<(), ResolutionError> {
        if self.frames.iter().any(|(frame_id, _)| *frame_id == id) {
            let chain = self
                .frames
                .iter()
                .map(|(_, frame_name)| *frame_name)
                .chain([name])
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ResolutionError::CircularDependency {
                type_name: name,
                chain,
            });
        }
        self.frames.push((id, name));
        Ok(())
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectable::{Dependency, Injectable};
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Config {
        url: String,
    }

    impl Config {
        fn test() -> Self {
            Self {
                url: "db://localhost".into(),
            }
        }
    }

    #[derive(Debug)]
    struct Database {
        config: Arc<Config>,
    }

    impl Injectable for Database {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<Config>()]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self {
                config: resolver.get::<Config>()?,
            })
        }
    }

    struct Repository {
        database: Arc<Database>,
    }

    impl Injectable for Repository {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<Database>()]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self {
                database: resolver.get::<Database>()?,
            })
        }
    }

    #[derive(Debug)]
    struct CycleA;
    struct CycleB;

    impl Injectable for CycleA {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<CycleB>()]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            resolver.get::<CycleB>()?;
            Ok(Self)
        }
    }

    impl Injectable for CycleB {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<CycleA>()]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            resolver.get::<CycleA>()?;
            Ok(Self)
        }
    }

    fn configured() -> ServiceContainer {
        let mut container = ServiceContainer::new();
        container
            .register_instance(Config::test())
            .register_singleton::<Database>()
            .register_transient::<Repository>();
        container
    }

    #[test]
    fn singleton_resolves_to_the_same_instance() {
        let container = configured();
        let first = container.resolve::<Database>().unwrap();
        let second = container.resolve::<Database>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.config.url, "db://localhost");
    }

    #[test]
    fn transient_resolves_to_fresh_instances() {
        let container = configured();
        let first = container.resolve::<Repository>().unwrap();
        let second = container.resolve::<Repository>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        // Both share the singleton database.
        assert!(Arc::ptr_eq(&first.database, &second.database));
    }

    #[test]
    fn unregistered_type_fails_by_name() {
        let container = ServiceContainer::new();
        let err = container.resolve::<Database>().unwrap_err();
        assert!(matches!(err, ResolutionError::NotRegistered { .. }));
        assert!(err.to_string().contains("Database"));
    }

    #[test]
    fn cycle_is_detected_with_the_full_chain() {
        let mut container = ServiceContainer::new();
        container
            .register_transient::<CycleA>()
            .register_transient::<CycleB>();

        let err = container.resolve::<CycleA>().unwrap_err();
        match err {
            ResolutionError::CircularDependency { chain, .. } => {
                assert!(chain.contains("CycleA"));
                assert!(chain.contains("CycleB"));
                assert!(chain.contains("->"));
            }
            other => panic!("expected a cycle error, got {other}"),
        }
    }

    #[test]
    fn container_is_usable_after_a_failed_resolve() {
        let mut container = configured();
        container.register_transient::<CycleA>();

        assert!(container.resolve::<CycleA>().is_err());
        // The per-call stack was unwound; unrelated resolution still works.
        container.resolve::<Repository>().unwrap();
    }

    #[test]
    fn validation_names_the_missing_dependency() {
        let mut container = ServiceContainer::new();
        container.register_singleton::<Database>(); // Config missing

        let err = container.validate_registrations().unwrap_err();
        match err {
            RegistrationError::MissingDependency {
                service,
                dependency,
            } => {
                assert!(service.contains("Database"));
                assert!(dependency.contains("Config"));
            }
            other => panic!("expected a missing-dependency error, got {other}"),
        }
    }

    #[test]
    fn validation_passes_on_a_complete_graph() {
        configured().validate_registrations().unwrap();
    }

    struct SelfLoop;

    impl Injectable for SelfLoop {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<SelfLoop>()]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            resolver.get::<SelfLoop>()?;
            Ok(Self)
        }
    }

    #[test]
    fn validation_rejects_self_dependency() {
        let mut container = ServiceContainer::new();
        container.register_singleton::<SelfLoop>();
        assert!(matches!(
            container.validate_registrations().unwrap_err(),
            RegistrationError::SelfDependency { .. }
        ));
    }

    #[derive(Default)]
    struct Cache {
        capacity: usize,
    }

    struct Handler {
        repository: Arc<Repository>,
        cache: Option<Arc<Cache>>,
        limits: Arc<Limits>,
    }

    #[derive(Default)]
    struct Limits {
        max_in_flight: usize,
    }

    impl Injectable for Handler {
        fn dependencies() -> Vec<Dependency> {
            vec![
                Dependency::required::<Repository>(),
                Dependency::optional::<Cache>(),
                Dependency::defaulted::<Limits>(),
            ]
        }

        fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self {
                repository: resolver.get::<Repository>()?,
                cache: resolver.get_optional::<Cache>(),
                limits: resolver.get_or_default::<Limits>(),
            })
        }
    }

    #[test]
    fn optional_and_defaulted_dependencies_may_be_absent() {
        let mut container = configured();
        container.register_transient::<Handler>();

        container.validate_registrations().unwrap();

        let handler = container.resolve::<Handler>().unwrap();
        assert!(handler.cache.is_none());
        assert_eq!(handler.limits.max_in_flight, 0);
        assert_eq!(handler.repository.database.config.url, "db://localhost");
    }

    #[test]
    fn optional_dependency_resolves_when_registered() {
        let mut container = configured();
        container
            .register_instance(Cache { capacity: 128 })
            .register_transient::<Handler>();

        let handler = container.resolve::<Handler>().unwrap();
        assert_eq!(handler.cache.as_ref().unwrap().capacity, 128);
    }

    #[test]
    fn instance_registration_returns_the_same_payload() {
        let container = configured();
        let first = container.resolve::<Config>().unwrap();
        let second = container.resolve::<Config>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn factory_registration_resolves_through_the_resolver() {
        let mut container = configured();
        container.register_factory::<String, _>(Lifetime::Transient, |resolver| {
            let config = resolver.get::<Config>()?;
            Ok(Arc::new(format!("dsn:{}", config.url)))
        });

        let dsn = container.resolve::<String>().unwrap();
        assert_eq!(*dsn, "dsn:db://localhost");
    }

    trait Notifier: Send + Sync {
        fn channel(&self) -> &'static str;
    }

    struct EmailNotifier;

    impl Injectable for EmailNotifier {
        fn construct(_resolver: &mut Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self)
        }
    }

    impl Notifier for EmailNotifier {
        fn channel(&self) -> &'static str {
            "email"
        }
    }

    #[test]
    fn trait_object_services_resolve_through_coercion() {
        let mut container = ServiceContainer::new();
        container.register_singleton_as::<dyn Notifier, EmailNotifier>(|imp| imp);

        assert!(container.is_registered::<dyn Notifier>());
        let notifier = container.resolve::<dyn Notifier>().unwrap();
        assert_eq!(notifier.channel(), "email");

        let descriptor = container.descriptor::<dyn Notifier>().unwrap();
        assert!(descriptor.implementation_name().contains("EmailNotifier"));
        assert_eq!(descriptor.lifetime(), Lifetime::Singleton);
    }

    #[test]
    fn reset_clears_cached_singletons() {
        let container = configured();
        let before = container.resolve::<Database>().unwrap();
        container.reset();
        let after = container.resolve::<Database>().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn registering_twice_replaces_the_descriptor() {
        let mut container = ServiceContainer::new();
        container.register_instance(Config {
            url: "db://first".into(),
        });
        container.register_instance(Config {
            url: "db://second".into(),
        });

        let config = container.resolve::<Config>().unwrap();
        assert_eq!(config.url, "db://second");
    }

    #[test]
    fn is_registered_reports_the_registry() {
        let container = configured();
        assert!(container.is_registered::<Database>());
        assert!(!container.is_registered::<Cache>());
    }
}
