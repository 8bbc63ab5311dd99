//! # Portico
//!
//! Hosts a request/response MVC admin panel on a persistent async HTTP
//! runtime. Requests are translated into a framework-neutral message,
//! matched against a route table (first match wins, in registration
//! order) and run through an onion of middleware before the response is
//! translated back for the runtime.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portico::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("portico.toml")?
//!         .with_dotenv()
//!         .with_env_prefix("PORTICO")
//!         .load()?;
//!     init_logging(&config.logging)?;
//!
//!     let dashboard: HandlerRef = Arc::new(handler_fn(|ctx: &mut PipelineContext| {
//!         let name = ctx.user().map(|u| u.name.clone()).unwrap_or_default();
//!         async move { ChainResult::Ok(OutboundMessage::text(StatusCode::OK, format!("hello {name}"))) }
//!     }));
//!
//!     let mut routes = RouteTable::new();
//!     routes.register(Method::Get, "/admin", "admin.dashboard", ["auth", "verified"], dashboard)?;
//!
//!     let sessions = Arc::new(InMemorySessionStore::new());
//!     let kernel = KernelBuilder::from_config(&config, sessions)?
//!         .routes(routes)
//!         .build()?;
//!
//!     Server::new(ServerConfig::from_section(&config.server)?, Arc::new(kernel))
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! hyper ─► Translator::inbound ─► RouteTable::match_route ─► Executor
//!                                                              │
//!             global ─► group ─► route middleware ─► handler ◄─┘
//!                                                              │
//! hyper ◄─ Translator::outbound ◄──────── OutboundMessage ◄────┘
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use portico_config as config;
pub use portico_core as core;
pub use portico_middleware as middleware;
pub use portico_router as router;
pub use portico_server as server;
pub use portico_telemetry as telemetry;
pub use portico_translate as translate;

/// Common imports.
///
/// ```rust
/// use portico::prelude::*;
///
/// let routes: RouteTable<HandlerRef> = RouteTable::new();
/// assert!(routes.is_empty());
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use http::StatusCode;

    pub use portico_config::{ConfigError, ConfigLoader, PorticoConfig};
    pub use portico_core::{
        AuthUser, ChainResult, Container, Fault, InboundMessage, Method, MiddlewareFault,
        OutboundMessage, RequestId, RequestScope, UploadedFile,
    };
    pub use portico_middleware::stages::{InMemorySessionStore, SessionStore};
    pub use portico_middleware::{
        handler_fn, Builtins, ErrorRenderer, Handler, Middleware, MiddlewareRegistry, Next,
        PipelineContext,
    };
    pub use portico_router::{RouteError, RouteTable};
    pub use portico_server::{
        ConfigReloader, HandlerRef, Kernel, KernelBuilder, ReloadError, Server, ServerConfig,
        ShutdownSignal,
    };
    pub use portico_telemetry::{init_logging, LogConfig};
    pub use portico_translate::TranslatorConfig;
}
