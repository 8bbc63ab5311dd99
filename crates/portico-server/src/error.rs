//! Server and reload errors.

use portico_config::ConfigError;
use portico_core::PipelineError;
use portico_router::RouteError;
use thiserror::Error;

/// The server could not start or keep running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address as configured.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The initial routing could not be built.
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// I/O error on the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A routing snapshot could not be built. The previous one stays live.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// A route's middleware list does not resolve.
    #[error("route '{route}': {source}")]
    Pipeline {
        /// Route label.
        route: String,
        /// What failed.
        #[source]
        source: PipelineError,
    },

    /// The global middleware list does not resolve.
    #[error("global middleware: {0}")]
    Global(#[source] PipelineError),

    /// Route registration failed.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_error_names_route() {
        let err = ReloadError::Pipeline {
            route: "admin.dashboard".to_string(),
            source: PipelineError::UnknownMiddleware("audit".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("admin.dashboard"));
        assert!(message.contains("audit"));
    }
}
