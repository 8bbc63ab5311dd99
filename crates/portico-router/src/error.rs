//! Registration and lookup errors.

use portico_core::Method;
use thiserror::Error;

/// Route registration failed.
///
/// These abort startup or a reload; the previous table stays live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The `(method, pattern)` pair is already taken.
    #[error("duplicate route: {method} {pattern} is already registered")]
    DuplicateRoute {
        /// Conflicting method, `*` for the wildcard filter.
        method: String,
        /// Normalized pattern.
        pattern: String,
    },

    /// Another route already uses this name.
    #[error("duplicate route name: {0}")]
    DuplicateName(String),

    /// The pattern could not be compiled.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern as written.
        pattern: String,
        /// What was wrong.
        reason: String,
    },

    /// URL generation lacked a value for a `{name}` segment.
    #[error("missing parameter '{param}' for route '{route}'")]
    MissingParameter {
        /// Route name.
        route: String,
        /// Parameter name.
        param: String,
    },
}

impl RouteError {
    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Nothing matched a request or a route name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteNotFoundError {
    /// No route matched the request and no fallback is registered.
    #[error("no route matches {method} {path}")]
    Path {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// No route carries the requested name.
    #[error("no route named '{0}'")]
    Name(String),
}

/// Failure building a URL from a route name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// Unknown route name.
    #[error(transparent)]
    NotFound(#[from] RouteNotFoundError),

    /// The route exists but a parameter is missing.
    #[error(transparent)]
    Route(#[from] RouteError),
}
