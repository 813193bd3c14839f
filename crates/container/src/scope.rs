//! Scopes: bounded lifetimes for scoped services.
//!
//! A [`Scope`] borrows the container and carries its own instance cache.
//! Scoped services resolve to one instance per scope; dropping the scope
//! releases them. Singletons and transients resolved through a scope behave
//! exactly as they do on the root container.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::{downcast_service, ResolutionStack, ServiceContainer};
use crate::descriptor::AnyService;
use crate::error::ResolutionError;

/// A unit of work holding per-scope instances.
pub struct Scope<'c> {
    container: &'c ServiceContainer,
    instances: Mutex<HashMap<TypeId, AnyService>>,
}

impl<'c> Scope<'c> {
    pub(crate) fn new(container: &'c ServiceContainer) -> Self {
        Self {
            container,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `S` within this scope.
    ///
    /// Scoped services are cached here; singletons delegate to the root
    /// container's cache; transients are fresh every time.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>, ResolutionError> {
        let mut stack = ResolutionStack::default();
        let erased = self.container.resolve_erased(
            TypeId::of::<S>(),
            type_name::<S>(),
            &mut stack,
            Some(self),
        )?;
        downcast_service::<S>(erased)
    }

    pub(crate) fn cached(&self, id: TypeId) -> Option<AnyService> {
        self.instances.lock().get(&id).cloned()
    }

    pub(crate) fn cache_or_existing(&self, id: TypeId, built: AnyService) -> AnyService {
        self.instances.lock().entry(id).or_insert(built).clone()
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cached_instances", &self.instances.lock().len())
            .finish()
    }
}
