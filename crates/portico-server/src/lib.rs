//! # Portico Server
//!
//! Hosts the bridge on a persistent tokio runtime:
//!
//! - [`Kernel`] translates, routes and executes one request at a time
//!   against a hot-swappable routing generation
//! - [`Server`] is the HTTP/1.1 accept loop with request timeouts, client
//!   disconnect detection and graceful shutdown
//! - [`ConfigReloader`] republishes middleware when the configuration
//!   file changes
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use portico_config::ConfigLoader;
//! use portico_core::{ChainResult, Method, OutboundMessage};
//! use portico_middleware::handler_fn;
//! use portico_middleware::stages::InMemorySessionStore;
//! use portico_router::RouteTable;
//! use portico_server::{HandlerRef, KernelBuilder, Server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("portico.toml")?
//!     .with_env_prefix("PORTICO")
//!     .load()?;
//!
//! let dashboard: HandlerRef = Arc::new(handler_fn(|_| async {
//!     ChainResult::Ok(OutboundMessage::html(StatusCode::OK, "<h1>Dashboard</h1>"))
//! }));
//! let mut routes = RouteTable::new();
//! routes.register(Method::Get, "/admin", "admin.dashboard", ["auth"], dashboard)?;
//!
//! let kernel = KernelBuilder::from_config(&config, Arc::new(InMemorySessionStore::new()))?
//!     .routes(routes)
//!     .build()?;
//!
//! Server::new(ServerConfig::from_section(&config.server)?, Arc::new(kernel))
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/portico-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod kernel;
mod reload;
mod server;
pub mod settings;
mod shutdown;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use error::{ReloadError, ServerError};
pub use kernel::{HandlerRef, Kernel, KernelBuilder, RouteListing, Routing};
pub use reload::ConfigReloader;
pub use server::Server;
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
