//! Observability for Portico.
//!
//! - **Logging**: `tracing-subscriber` with JSON or human-readable output
//!   and a shared set of field names
//! - **Metrics**: request counters, latency histograms and an in-flight
//!   gauge through the `metrics` facade
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `portico_requests_total` | Counter | `route`, `status` | Completed requests |
//! | `portico_request_duration_seconds` | Histogram | `route` | Request latency |
//! | `portico_in_flight_requests` | Gauge | - | Requests being processed |
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_telemetry::{init_telemetry, LogConfig};
//!
//! init_telemetry(&LogConfig::production())?;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig, LogFormat};
pub use metrics::{describe_metrics, record_request, InFlightGuard};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging and registers metric descriptions.
///
/// # Errors
///
/// Returns `TelemetryError` if logging cannot be installed.
pub fn init_telemetry(logging: &LogConfig) -> TelemetryResult<()> {
    init_logging(logging)?;
    describe_metrics();
    Ok(())
}
