//! Structured logging for Portico.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and either
//! a JSON formatter (production) or a human-readable one (development).
//!
//! # Example
//!
//! ```rust
//! use portico_telemetry::logging::{fields, init_logging, LogConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = "0190a8f2", http.path = "/admin", "request completed");
//! assert_eq!(fields::HTTP_PATH, "http.path");
//! # Ok(())
//! # }
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line, human-readable.
    Pretty,
    /// Single-line, human-readable.
    Compact,
}

/// Logging configuration.
///
/// Read from the `[logging]` section of the configuration file; every field
/// has a default.
///
/// # Example
///
/// ```rust
/// use portico_telemetry::logging::{LogConfig, LogFormat};
///
/// let config = LogConfig {
///     level: "portico_server=debug,info".to_string(),
///     ..LogConfig::production()
/// };
/// assert_eq!(config.format, LogFormat::Json);
/// assert!(!config.span_events);
///
/// let dev = LogConfig::development();
/// assert_eq!(dev.format, LogFormat::Pretty);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Whether logging is installed at all.
    pub enabled: bool,

    /// Filter directive (e.g. `"info"`, `"portico_server=debug,info"`).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to log span open and close events.
    pub span_events: bool,

    /// Whether to include file and line.
    pub file_line_info: bool,

    /// Whether to include thread ids.
    pub thread_ids: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,

    /// Whether to colour human-readable output.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
            ansi: true,
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            ansi: false,
        }
    }
}

/// Installs the global subscriber.
///
/// A disabled config installs nothing and succeeds.
///
/// ```rust
/// use portico_telemetry::logging::{init_logging, LogConfig};
///
/// let off = LogConfig { enabled: false, ..LogConfig::default() };
/// assert!(init_logging(&off).is_ok());
///
/// let bad = LogConfig { level: "portico=notalevel".to_string(), ..LogConfig::default() };
/// assert!(init_logging(&bad).is_err());
/// ```
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_thread_ids(config.thread_ids)
        .with_target(config.include_target);

    let layer = match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_ansi(config.ansi).with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_ansi(config.ansi).with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Creates an env filter from a directive string.
///
/// ```rust
/// use portico_telemetry::logging::create_env_filter;
///
/// assert!(create_env_filter("portico_router=trace,warn").is_ok());
/// assert!(create_env_filter("portico=notalevel").is_err());
/// ```
///
/// # Errors
///
/// Returns error if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level '{filter}': {e}")))
}

/// Standard log field names.
pub mod fields {
    /// Request ID.
    pub const REQUEST_ID: &str = "request_id";

    /// HTTP method.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP path.
    pub const HTTP_PATH: &str = "http.path";

    /// HTTP status code.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Matched route name.
    pub const ROUTE: &str = "route";

    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";

    /// Error.
    pub const ERROR: &str = "error";

    /// Authenticated user.
    pub const USER_ID: &str = "user_id";
}
