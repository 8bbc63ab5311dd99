//! Request metrics.
//!
//! Recorded through the `metrics` facade. The core never installs an
//! exporter; the embedding application picks one, and until it does every
//! call here is a no-op.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `portico_requests_total` | Counter | `route`, `status` | Completed requests |
//! | `portico_request_duration_seconds` | Histogram | `route` | Request latency |
//! | `portico_in_flight_requests` | Gauge | - | Requests being processed |
//! | `portico_aborted_requests_total` | Counter | `route` | Requests abandoned on disconnect |
//! | `portico_route_reloads_total` | Counter | `result` | Route table reloads |

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Completed requests.
    pub const REQUESTS_TOTAL: &str = "portico_requests_total";
    /// Request latency.
    pub const REQUEST_DURATION: &str = "portico_request_duration_seconds";
    /// Requests being processed.
    pub const IN_FLIGHT: &str = "portico_in_flight_requests";
    /// Requests abandoned on disconnect.
    pub const ABORTED_TOTAL: &str = "portico_aborted_requests_total";
    /// Route table reloads.
    pub const RELOADS_TOTAL: &str = "portico_route_reloads_total";
}

/// Label used when no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

static DESCRIBE: Once = Once::new();

/// Registers descriptions for the standard metrics with the installed
/// recorder. Safe to call more than once.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(names::REQUESTS_TOTAL, "Total number of requests processed");
        describe_histogram!(names::REQUEST_DURATION, "Request duration in seconds");
        describe_gauge!(names::IN_FLIGHT, "Number of requests currently being processed");
        describe_counter!(
            names::ABORTED_TOTAL,
            "Requests abandoned because the client disconnected"
        );
        describe_counter!(names::RELOADS_TOTAL, "Route table reloads by result");
    });
}

/// Records a completed request.
pub fn record_request(route: &str, status_code: u16, duration: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(names::REQUEST_DURATION, "route" => route.to_string())
        .record(duration.as_secs_f64());
}

/// Records a request abandoned because its client went away.
pub fn record_aborted(route: &str) {
    counter!(names::ABORTED_TOTAL, "route" => route.to_string()).increment(1);
}

/// Records a route table reload.
pub fn record_reload(succeeded: bool) {
    let result = if succeeded { "success" } else { "failure" };
    counter!(names::RELOADS_TOTAL, "result" => result).increment(1);
}

/// Guard that decrements in-flight requests on drop.
///
/// Dropped on every exit path, including a cancelled request future.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT).decrement(1.0);
    }
}
