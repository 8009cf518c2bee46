//! Pluggable dependency resolution for rule actions.
//!
//! Actions obtain host services (repositories, notifiers, clocks) through
//! the session's resolver instead of capturing them at compile time. The
//! default [`ServiceRegistry`] is a name-keyed map; hosts with their own
//! container implement [`DependencyResolver`] over it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves a named service to a shared, type-erased instance.
pub trait DependencyResolver {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Default resolver: a plain name-keyed registry.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ServiceRegistry").field("services", &names).finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance under a name, replacing any previous
    /// binding.
    pub fn register<T: Any + Send + Sync>(&mut self, name: impl Into<String>, service: Arc<T>) {
        self.services.insert(name.into(), service);
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl DependencyResolver for ServiceRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(name).cloned()
    }
}
