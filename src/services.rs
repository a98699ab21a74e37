//! Named service lookup.
//!
//! waypost does not own configuration stores, log sinks or translation
//! catalogues. The application registers them here by name at startup, and
//! handlers resolve them through the [`Context`](crate::Context).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Singleton = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Name → service registry. Read-only once serving starts.
#[derive(Clone, Default)]
pub struct Services {
    singletons: HashMap<String, Singleton>,
    factories: HashMap<String, Factory>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared instance under `name`, replacing any earlier one.
    pub fn singleton<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, service: T) {
        self.singletons.insert(name.into(), Arc::new(service));
    }

    /// Register a constructor called on every [`Services::instance`] lookup.
    pub fn factory<T, F>(&mut self, name: impl Into<String>, make: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factories
            .insert(name.into(), Arc::new(move || Box::new(make()) as Box<dyn Any + Send>));
    }

    /// The singleton registered under `name`, if it exists and is a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let service = Arc::clone(self.singletons.get(name)?);
        service.downcast::<T>().ok()
    }

    /// A fresh instance from the factory registered under `name`.
    pub fn instance<T: Send + 'static>(&self, name: &str) -> Option<T> {
        let made = (self.factories.get(name)?)();
        made.downcast::<T>().ok().map(|b| *b)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("singletons", &self.singletons.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
