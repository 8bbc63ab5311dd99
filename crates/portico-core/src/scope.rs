//! Process container and per-request scope.
//!
//! The [`Container`] holds process singletons and the factories for
//! request-scoped services. It is populated at startup and shared immutably
//! afterwards. Each request gets a fresh [`RequestScope`] that lazily runs
//! those factories and holds values bound during the request (such as the
//! authenticated user). A scope is dropped with its request, so nothing bound
//! in it can leak into the next one.
//!
//! # Example
//!
//! ```rust
//! use portico_core::scope::Container;
//! use std::sync::Arc;
//!
//! struct Mailer;
//! struct Cart(Vec<u32>);
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Mailer));
//! container.register_scoped(|_| Cart(Vec::new()));
//!
//! let container = Arc::new(container);
//! let mut scope = container.begin_scope();
//! assert!(scope.resolve::<Mailer>().is_some());
//! assert!(scope.resolve::<Cart>().is_some());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Service = Arc<dyn Any + Send + Sync>;
type ScopedFactory = Arc<dyn Fn(&Container) -> Service + Send + Sync>;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone)]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl fmt::Display for InjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to inject {}: {}", self.type_name, self.reason)
    }
}

impl std::error::Error for InjectionError {}

impl InjectionError {
    /// Creates a new injection error for a missing service.
    pub fn not_registered<T>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: "service not registered".to_string(),
        }
    }
}

/// Process-lifetime service container.
///
/// Singletons are shared by every request. Scoped factories are stored here
/// but their products are only ever cached in a [`RequestScope`].
#[derive(Default)]
pub struct Container {
    singletons: HashMap<TypeId, Service>,
    scoped: HashMap<TypeId, ScopedFactory>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a process singleton.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.singletons.insert(TypeId::of::<T>(), service);
    }

    /// Registers a factory producing a fresh `T` for every request.
    pub fn register_scoped<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.scoped.insert(
            TypeId::of::<T>(),
            Arc::new(move |c: &Container| Arc::new(factory(c)) as Service),
        );
    }

    /// Resolves a process singleton.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.singletons
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Resolves a singleton or returns an error.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// Checks if a singleton or scoped factory is registered for `T`.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.singletons.contains_key(&id) || self.scoped.contains_key(&id)
    }

    /// Number of singletons plus scoped factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.singletons.len() + self.scoped.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.singletons.is_empty() && self.scoped.is_empty()
    }

    /// Opens a fresh request scope over this container.
    #[must_use]
    pub fn begin_scope(self: &Arc<Self>) -> RequestScope {
        RequestScope::new(Arc::clone(self))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("singleton_count", &self.singletons.len())
            .field("scoped_count", &self.scoped.len())
            .finish()
    }
}

/// Per-request bindings layered over the process [`Container`].
///
/// Lookup order: values bound in this scope, then scoped factories (run once
/// per scope), then process singletons.
pub struct RequestScope {
    container: Arc<Container>,
    bindings: HashMap<TypeId, Service>,
}

impl RequestScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            bindings: HashMap::new(),
        }
    }

    /// Binds a value for the rest of this request, replacing any earlier binding.
    pub fn bind<T: Send + Sync + 'static>(&mut self, value: T) {
        self.bindings.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns a value already bound in this scope, without running factories.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.bindings
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// `true` if a value of type `T` is bound in this scope.
    #[must_use]
    pub fn is_bound<T: Send + Sync + 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// Resolves `T` from the scope, its factories or the process singletons.
    pub fn resolve<T: Send + Sync + 'static>(&mut self) -> Option<Arc<T>> {
        let id = TypeId::of::<T>();
        if let Some(bound) = self.get::<T>() {
            return Some(bound);
        }
        if let Some(factory) = self.container.scoped.get(&id) {
            let service = factory(&self.container);
            self.bindings.insert(id, Arc::clone(&service));
            return service.downcast::<T>().ok();
        }
        self.container.resolve::<T>()
    }

    /// Resolves `T` or returns an error.
    pub fn resolve_required<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// The process container behind this scope.
    #[must_use]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Number of values bound in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing has been bound yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("binding_count", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestService {
        value: i32,
    }

    #[test]
    fn test_container_register_and_resolve() {
        let mut container = Container::new();
        container.register(Arc::new(TestService { value: 42 }));

        let service: Arc<TestService> = container.resolve().unwrap();
        assert_eq!(service.value, 42);
        assert!(container.contains::<TestService>());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_container_resolve_required_missing() {
        let container = Container::new();
        let err = container.resolve_required::<TestService>().unwrap_err();
        assert!(err.type_name.contains("TestService"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_scoped_factory_runs_once_per_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut container = Container::new();
        container.register_scoped(move |_| TestService {
            value: i32::try_from(counter.fetch_add(1, Ordering::SeqCst)).unwrap(),
        });
        let container = Arc::new(container);

        let mut first = container.begin_scope();
        let a = first.resolve::<TestService>().unwrap();
        let b = first.resolve::<TestService>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut second = container.begin_scope();
        let c = second.resolve::<TestService>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The container itself never caches scoped products.
        assert!(container.resolve::<TestService>().is_none());
    }

    #[test]
    fn test_bindings_do_not_cross_scopes() {
        let container = Arc::new(Container::new());

        let mut first = container.begin_scope();
        first.bind(TestService { value: 1 });
        assert!(first.is_bound::<TestService>());

        let mut second = container.begin_scope();
        assert!(second.resolve::<TestService>().is_none());
        assert!(second.is_empty());
    }

    #[test]
    fn test_binding_shadows_singleton() {
        let mut container = Container::new();
        container.register(Arc::new(TestService { value: 1 }));
        let container = Arc::new(container);

        let mut scope = container.begin_scope();
        assert_eq!(scope.resolve::<TestService>().unwrap().value, 1);
        scope.bind(TestService { value: 2 });
        assert_eq!(scope.resolve::<TestService>().unwrap().value, 2);
    }
}
