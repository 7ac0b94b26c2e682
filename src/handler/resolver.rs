//! Service instance resolution.
//!
//! A bound handler asks the channel's [`ServiceResolver`] for an instance
//! of its service on every call. When the resolver has no registration
//! for the type, the binder falls back to `Default::default()`.
//!
//! # Example
//!
//! ```
//! use rpc_channel::handler::{resolve, ServiceRegistry};
//!
//! #[derive(Default)]
//! struct Counter { start: u32 }
//!
//! let registry = ServiceRegistry::new().singleton(Counter { start: 10 });
//! let counter = resolve::<Counter>(&registry).unwrap();
//! assert_eq!(counter.start, 10);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased service instance.
pub type AnyService = Arc<dyn Any + Send + Sync>;

/// Lookup of service instances by type.
pub trait ServiceResolver: Send + Sync + 'static {
    /// Get an instance of the service with the given type id, if registered.
    fn resolve_any(&self, service: TypeId) -> Option<AnyService>;
}

/// Resolve a typed service instance.
pub fn resolve<S: Send + Sync + 'static>(resolver: &dyn ServiceResolver) -> Option<Arc<S>> {
    resolver
        .resolve_any(TypeId::of::<S>())
        .and_then(|instance| instance.downcast::<S>().ok())
}

type Factory = Arc<dyn Fn() -> AnyService + Send + Sync>;

enum Registration {
    /// Same instance for every call.
    Shared(AnyService),
    /// Fresh instance for every call.
    Transient(Factory),
}

/// Registry of service instances and factories.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Registration>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single instance shared by every call.
    pub fn singleton<S: Send + Sync + 'static>(self, instance: S) -> Self {
        self.shared(Arc::new(instance))
    }

    /// Register an already shared instance.
    pub fn shared<S: Send + Sync + 'static>(mut self, instance: Arc<S>) -> Self {
        self.services
            .insert(TypeId::of::<S>(), Registration::Shared(instance));
        self
    }

    /// Register a factory called once per resolution.
    pub fn transient<S, F>(mut self, factory: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as AnyService);
        self.services
            .insert(TypeId::of::<S>(), Registration::Transient(factory));
        self
    }

    /// Check whether a service type is registered.
    pub fn contains<S: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceResolver for ServiceRegistry {
    fn resolve_any(&self, service: TypeId) -> Option<AnyService> {
        match self.services.get(&service)? {
            Registration::Shared(instance) => Some(Arc::clone(instance)),
            Registration::Transient(factory) => Some(factory()),
        }
    }
}
