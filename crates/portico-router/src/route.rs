//! Registered routes.

use std::collections::BTreeSet;

use portico_core::Method;
use serde::Serialize;

use crate::pattern::PathPattern;

/// Methods a route answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Every method (`*`).
    Any,
    /// An explicit set.
    Only(BTreeSet<Method>),
}

impl MethodFilter {
    /// Builds a filter from a list; `GET` implies `HEAD`.
    #[must_use]
    pub fn only(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut set: BTreeSet<Method> = methods.into_iter().collect();
        if set.contains(&Method::Get) {
            set.insert(Method::Head);
        }
        Self::Only(set)
    }

    /// `true` if `method` passes the filter.
    #[must_use]
    pub fn allows(&self, method: Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&method),
        }
    }

    /// First method both filters accept; `None` if they are disjoint.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<String> {
        match (self, other) {
            (Self::Any, Self::Any) => Some("*".to_string()),
            (Self::Any, Self::Only(set)) | (Self::Only(set), Self::Any) => {
                set.iter().next().map(|m| m.as_str().to_string())
            }
            (Self::Only(a), Self::Only(b)) => {
                a.intersection(b).next().map(|m| m.as_str().to_string())
            }
        }
    }

    /// Method names for listings; `["*"]` for the wildcard.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Any => vec!["*".to_string()],
            Self::Only(set) => set.iter().map(|m| m.as_str().to_string()).collect(),
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        Self::only([method])
    }
}

impl From<&[Method]> for MethodFilter {
    fn from(methods: &[Method]) -> Self {
        Self::only(methods.iter().copied())
    }
}

impl<const N: usize> From<[Method; N]> for MethodFilter {
    fn from(methods: [Method; N]) -> Self {
        Self::only(methods)
    }
}

/// An immutable registered route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor<H> {
    name: Option<String>,
    methods: MethodFilter,
    pattern: PathPattern,
    middleware: Vec<String>,
    handler: H,
}

impl<H> RouteDescriptor<H> {
    pub(crate) fn new(
        name: Option<String>,
        methods: MethodFilter,
        pattern: PathPattern,
        middleware: Vec<String>,
        handler: H,
    ) -> Self {
        Self {
            name,
            methods,
            pattern,
            middleware,
            handler,
        }
    }

    pub(crate) fn with_handler<H2>(self, handler: H2) -> RouteDescriptor<H2> {
        RouteDescriptor {
            name: self.name,
            methods: self.methods,
            pattern: self.pattern,
            middleware: self.middleware,
            handler,
        }
    }

    /// Route name, if the route was named.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Method filter.
    #[must_use]
    pub const fn methods(&self) -> &MethodFilter {
        &self.methods
    }

    /// Compiled pattern.
    #[must_use]
    pub const fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Middleware identifiers exactly as registered.
    #[must_use]
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    /// The handler.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Label for logs: the name, or `METHODS pattern` for unnamed routes.
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!("{} {}", self.methods.names().join("|"), self.pattern)
        })
    }

    /// A serializable summary.
    #[must_use]
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            methods: self.methods.names(),
            path: self.pattern.as_str().to_string(),
            name: self.name.clone(),
            middleware: self.middleware.clone(),
        }
    }
}

/// One row of the route listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSnapshot {
    /// Accepted methods, `["*"]` for any.
    pub methods: Vec<String>,
    /// Normalized pattern.
    pub path: String,
    /// Route name.
    pub name: Option<String>,
    /// Middleware identifiers as registered.
    pub middleware: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_implies_head() {
        let filter = MethodFilter::from(Method::Get);
        assert!(filter.allows(Method::Head));
        assert_eq!(filter.names(), vec!["GET", "HEAD"]);

        let filter = MethodFilter::from(Method::Post);
        assert!(!filter.allows(Method::Head));
    }

    #[test]
    fn test_overlap() {
        let get = MethodFilter::from(Method::Get);
        let head = MethodFilter::from(Method::Head);
        let post = MethodFilter::from([Method::Post, Method::Put]);

        assert_eq!(get.overlap(&head).as_deref(), Some("HEAD"));
        assert_eq!(get.overlap(&post), None);
        assert_eq!(MethodFilter::Any.overlap(&post).as_deref(), Some("POST"));
        assert_eq!(MethodFilter::Any.overlap(&MethodFilter::Any).as_deref(), Some("*"));
    }
}
