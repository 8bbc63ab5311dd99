//! Typed configuration for Portico.
//!
//! - TOML and JSON configuration files
//! - `.env` files through `dotenvy`
//! - `PORTICO_*` environment variable overrides
//! - Strict validation (unknown fields are rejected)
//! - File watching for middleware reloads
//!
//! # Example
//!
//! ```no_run
//! use portico_config::ConfigLoader;
//!
//! # fn main() -> Result<(), portico_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("portico.toml")?
//!     .with_dotenv()
//!     .with_env_prefix("PORTICO")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//!
//! [translator]
//! max_body_size = 8388608
//! trusted_proxies = ["10.0.0.1"]
//!
//! [middleware]
//! login_path = "/login"
//! global = [{ id = "request_id", priority = 0 }]
//!
//! [middleware.groups]
//! web = ["auth", "verified"]
//! panel = ["web", "throttle:60,1"]
//!
//! [middleware.aliases]
//! signed-in = "auth"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [diagnostics]
//! routes_path = "/_portico/routes"
//! ```

#![doc(html_root_url = "https://docs.rs/portico-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;
mod watcher;

pub use config::PorticoConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use portico_telemetry::{LogConfig, LogFormat};
pub use schema::{
    DiagnosticsSection, GlobalMiddleware, MiddlewareSection, ServerSection, TranslatorSection,
};
pub use watcher::{FileChangeEvent, FileChangeKind, FileWatcher, FileWatcherBuilder};
