//! The ordered route table.

use std::collections::HashMap;

use portico_core::Method;

use crate::error::{RouteError, RouteNotFoundError, UrlError};
use crate::params::Params;
use crate::pattern::{split_path, PathPattern};
use crate::route::{MethodFilter, RouteDescriptor, RouteSnapshot};

/// A matched route with its decoded parameters.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// The route that matched.
    pub route: &'a RouteDescriptor<H>,
    /// Decoded `{name}` values.
    pub params: Params,
}

/// Routes in registration order, plus an optional fallback.
///
/// Matching walks the routes in the order they were registered and returns
/// the first one whose method filter and pattern both accept the request.
/// There is no specificity ranking: a parameterized route registered before
/// a literal one shadows it. The fallback (pattern `*`) is only consulted
/// after every other route.
///
/// # Example
///
/// ```rust
/// use portico_core::Method;
/// use portico_router::RouteTable;
///
/// let mut table = RouteTable::new();
/// table
///     .register(Method::Get, "/resources/{id}", "resources.show", ["auth"], "show")
///     .unwrap();
/// table
///     .register(Method::Get, "/resources/active", "resources.active", ["auth"], "active")
///     .unwrap();
///
/// let m = table.match_route(Method::Get, "/resources/active").unwrap();
/// assert_eq!(*m.route.handler(), "show");
/// assert_eq!(m.params.get("id"), Some("active"));
/// ```
#[derive(Debug, Clone)]
pub struct RouteTable<H> {
    routes: Vec<RouteDescriptor<H>>,
    fallback: Option<RouteDescriptor<H>>,
    names: HashMap<String, Slot>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Route(usize),
    Fallback,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            fallback: None,
            names: HashMap::new(),
        }
    }
}

impl<H> RouteTable<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route.
    ///
    /// An empty `name` leaves the route unnamed. The pattern `*` registers
    /// the fallback, which must accept every method; only one is allowed.
    /// An empty method list is rejected.
    pub fn register<M, I, S>(
        &mut self,
        methods: M,
        pattern: &str,
        name: &str,
        middleware: I,
        handler: H,
    ) -> Result<(), RouteError>
    where
        M: Into<MethodFilter>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(
            methods.into(),
            pattern,
            name,
            middleware.into_iter().map(Into::into).collect(),
            handler,
        )
    }

    /// Registers a route answering every method.
    pub fn any<I, S>(
        &mut self,
        pattern: &str,
        name: &str,
        middleware: I,
        handler: H,
    ) -> Result<(), RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(MethodFilter::Any, pattern, name, middleware, handler)
    }

    /// Registers the `*` / `*` fallback.
    pub fn fallback<I, S>(&mut self, middleware: I, handler: H) -> Result<(), RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(MethodFilter::Any, "*", "", middleware, handler)
    }

    /// Registers routes sharing a path prefix, name prefix and middleware.
    ///
    /// Group middleware is prepended to each route's own list.
    ///
    /// ```rust
    /// use portico_core::Method;
    /// use portico_router::RouteTable;
    ///
    /// let mut table = RouteTable::new();
    /// table
    ///     .group("/admin", "admin.", ["web", "auth"], |admin| {
    ///         admin.register(Method::Get, "/", "dashboard", ["verified"], 1)?;
    ///         admin.register(Method::Get, "/users", "users", Vec::<String>::new(), 2)
    ///     })
    ///     .unwrap();
    ///
    /// let m = table.match_route(Method::Get, "/admin").unwrap();
    /// assert_eq!(m.route.name(), Some("admin.dashboard"));
    /// assert_eq!(m.route.middleware(), ["web", "auth", "verified"]);
    /// ```
    pub fn group<I, S, F>(
        &mut self,
        prefix: &str,
        name_prefix: &str,
        middleware: I,
        build: F,
    ) -> Result<(), RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut RouteGroup<'_, H>) -> Result<(), RouteError>,
    {
        let mut group = RouteGroup {
            table: self,
            prefix: prefix.to_string(),
            name_prefix: name_prefix.to_string(),
            middleware: middleware.into_iter().map(Into::into).collect(),
        };
        build(&mut group)
    }

    fn insert(
        &mut self,
        methods: MethodFilter,
        pattern: &str,
        name: &str,
        middleware: Vec<String>,
        handler: H,
    ) -> Result<(), RouteError> {
        let compiled = PathPattern::parse(pattern)?;

        if matches!(&methods, MethodFilter::Only(set) if set.is_empty()) {
            return Err(RouteError::invalid(pattern, "route accepts no methods"));
        }

        if !name.is_empty() && self.names.contains_key(name) {
            return Err(RouteError::DuplicateName(name.to_string()));
        }

        if compiled.is_catch_all() {
            if methods != MethodFilter::Any {
                return Err(RouteError::invalid(
                    pattern,
                    "the catch-all route must accept every method",
                ));
            }
            if self.fallback.is_some() {
                return Err(RouteError::DuplicateRoute {
                    method: "*".to_string(),
                    pattern: "*".to_string(),
                });
            }
        }

        let existing = self
            .routes
            .iter()
            .filter(|r| !compiled.is_catch_all() && r.pattern().as_str() == compiled.as_str());
        for route in existing {
            if let Some(method) = route.methods().overlap(&methods) {
                return Err(RouteError::DuplicateRoute {
                    method,
                    pattern: compiled.as_str().to_string(),
                });
            }
        }

        let name = (!name.is_empty()).then(|| name.to_string());
        let catch_all = compiled.is_catch_all();
        let descriptor = RouteDescriptor::new(name.clone(), methods, compiled, middleware, handler);

        let slot = if catch_all {
            self.fallback = Some(descriptor);
            Slot::Fallback
        } else {
            self.routes.push(descriptor);
            Slot::Route(self.routes.len() - 1)
        };
        if let Some(name) = name {
            self.names.insert(name, slot);
        }
        Ok(())
    }

    /// Finds the first route accepting `method` and `path`.
    pub fn match_route(
        &self,
        method: Method,
        path: &str,
    ) -> Result<RouteMatch<'_, H>, RouteNotFoundError> {
        let segments = split_path(path);

        let candidates = self.routes.iter().chain(self.fallback.iter());
        for route in candidates {
            if !route.methods().allows(method) {
                continue;
            }
            if let Some(params) = route.pattern().match_segments(&segments) {
                return Ok(RouteMatch { route, params });
            }
        }

        Err(RouteNotFoundError::Path {
            method,
            path: path.to_string(),
        })
    }

    /// Looks a route up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RouteDescriptor<H>> {
        match self.names.get(name)? {
            Slot::Route(index) => self.routes.get(*index),
            Slot::Fallback => self.fallback.as_ref(),
        }
    }

    /// Builds a path for a named route.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Result<String, UrlError> {
        let route = self
            .get(name)
            .ok_or_else(|| RouteNotFoundError::Name(name.to_string()))?;
        let path = route.pattern().render(name, |param| {
            params
                .iter()
                .find(|(key, _)| *key == param)
                .map(|(_, value)| *value)
        })?;
        Ok(path)
    }

    /// Iterates routes in match order, fallback last.
    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor<H>> {
        self.routes.iter().chain(self.fallback.iter())
    }

    /// Summaries of every route in match order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        self.iter().map(RouteDescriptor::snapshot).collect()
    }

    /// Every distinct middleware identifier referenced by a route.
    #[must_use]
    pub fn middleware_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.iter().flat_map(|r| r.middleware().iter()) {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Replaces every handler, keeping order, names and patterns.
    ///
    /// Stops at the first error from `f`.
    pub fn try_map<H2, E, F>(self, mut f: F) -> Result<RouteTable<H2>, E>
    where
        F: FnMut(&RouteDescriptor<H>) -> Result<H2, E>,
    {
        let mut convert = |route: RouteDescriptor<H>| -> Result<RouteDescriptor<H2>, E> {
            let handler = f(&route)?;
            Ok(route.with_handler(handler))
        };
        let routes = self
            .routes
            .into_iter()
            .map(&mut convert)
            .collect::<Result<Vec<_>, E>>()?;
        let fallback = self.fallback.map(&mut convert).transpose()?;
        Ok(RouteTable {
            routes,
            fallback,
            names: self.names,
        })
    }

    /// Number of routes, including the fallback.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len() + usize::from(self.fallback.is_some())
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if a fallback route is registered.
    #[must_use]
    pub const fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Registration handle scoped to a [`RouteTable::group`] call.
#[derive(Debug)]
pub struct RouteGroup<'t, H> {
    table: &'t mut RouteTable<H>,
    prefix: String,
    name_prefix: String,
    middleware: Vec<String>,
}

impl<H> RouteGroup<'_, H> {
    /// Registers a route inside the group.
    pub fn register<M, I, S>(
        &mut self,
        methods: M,
        pattern: &str,
        name: &str,
        middleware: I,
        handler: H,
    ) -> Result<(), RouteError>
    where
        M: Into<MethodFilter>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let full_pattern = join_prefix(&self.prefix, pattern);
        let full_name = if name.is_empty() {
            String::new()
        } else {
            format!("{}{name}", self.name_prefix)
        };
        let stack = self
            .middleware
            .iter()
            .cloned()
            .chain(middleware.into_iter().map(Into::into))
            .collect();
        self.table
            .insert(methods.into(), &full_pattern, &full_name, stack, handler)
    }

    /// Opens a nested group; prefixes and middleware accumulate.
    pub fn group<I, S, F>(
        &mut self,
        prefix: &str,
        name_prefix: &str,
        middleware: I,
        build: F,
    ) -> Result<(), RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut RouteGroup<'_, H>) -> Result<(), RouteError>,
    {
        let mut nested = RouteGroup {
            table: &mut *self.table,
            prefix: join_prefix(&self.prefix, prefix),
            name_prefix: format!("{}{name_prefix}", self.name_prefix),
            middleware: self
                .middleware
                .iter()
                .cloned()
                .chain(middleware.into_iter().map(Into::into))
                .collect(),
        };
        build(&mut nested)
    }
}

fn join_prefix(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    format!("{prefix}/{pattern}")
}
