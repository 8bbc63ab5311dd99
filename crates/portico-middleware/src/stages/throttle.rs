//! Rate limiting middleware.
//!
//! `throttle:max,minutes` allows `max` requests per fixed window of
//! `minutes` (default 1) for each route and client. The client is the
//! authenticated user when `auth` ran first, otherwise the client address.
//!
//! Counters live in a [`RateLimitStore`] shared by every `throttle`
//! instance through the process container, so differently parameterized
//! routes still see one store.
//!
//! ## Response headers
//!
//! - `X-RateLimit-Limit`, `X-RateLimit-Remaining` on every throttled response
//! - `Retry-After`, `X-RateLimit-Reset`, `X-RateLimit-Reset-After` on 429

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{HeaderName, HeaderValue};
use portico_core::{ChainResult, MiddlewareFault, PipelineError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix timestamp when the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
    /// Seconds until the window resets.
    pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request fits in the window.
    Allowed {
        /// Maximum requests per window.
        limit: u64,
        /// Requests left after this one.
        remaining: u64,
    },
    /// The window is exhausted.
    Limited {
        /// Maximum requests per window.
        limit: u64,
        /// Time until the window resets.
        reset_in: Duration,
    },
}

/// Hits between sweeps of expired windows.
pub const DEFAULT_SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
    length: Duration,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

#[derive(Debug, Default)]
struct Windows {
    entries: HashMap<String, Window>,
    hits_since_sweep: u64,
}

impl Windows {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, window| !window.expired(now));
        self.hits_since_sweep = 0;
        before - self.entries.len()
    }
}

/// Fixed-window counters keyed by route and client.
///
/// Keys come from client addresses and users, so expired windows are
/// dropped every `sweep_every` hits to keep the map bounded by the clients
/// active within one window.
#[derive(Debug)]
pub struct RateLimitStore {
    windows: Mutex<Windows>,
    sweep_every: u64,
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self {
            windows: Mutex::new(Windows::default()),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }
}

impl RateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweeps expired windows every `hits` hits instead of the default.
    #[must_use]
    pub fn with_sweep_every(mut self, hits: u64) -> Self {
        self.sweep_every = hits.max(1);
        self
    }

    /// Counts a request against `key`.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn hit(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        windows.hits_since_sweep += 1;
        if windows.hits_since_sweep >= self.sweep_every {
            let dropped = windows.sweep(now);
            if dropped > 0 {
                debug!(dropped, "expired rate limit windows dropped");
            }
        }

        let entry = windows.entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
            length: window,
        });

        if entry.expired(now) {
            entry.count = 0;
            entry.started = now;
        }
        entry.length = window;

        if entry.count >= limit {
            let reset_in = window.saturating_sub(now.duration_since(entry.started));
            return RateLimitDecision::Limited { limit, reset_in };
        }

        entry.count += 1;
        RateLimitDecision::Allowed {
            limit,
            remaining: limit - entry.count,
        }
    }

    /// Drops every expired window now; returns how many went.
    pub async fn purge_expired(&self) -> usize {
        self.windows.lock().await.sweep(Instant::now())
    }

    /// Forgets the counter for `key`.
    pub async fn clear(&self, key: &str) {
        self.windows.lock().await.entries.remove(key);
    }

    /// Number of tracked keys.
    pub async fn len(&self) -> usize {
        self.windows.lock().await.entries.len()
    }

    /// `true` if nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.windows.lock().await.entries.is_empty()
    }
}

/// The `throttle` middleware.
#[derive(Debug, Clone)]
pub struct ThrottleMiddleware {
    max_attempts: u64,
    window: Duration,
    store: Arc<RateLimitStore>,
}

impl ThrottleMiddleware {
    /// Allows `max_attempts` per `window`.
    #[must_use]
    pub const fn new(max_attempts: u64, window: Duration, store: Arc<RateLimitStore>) -> Self {
        Self {
            max_attempts,
            window,
            store,
        }
    }

    /// Builds from the `max,minutes` arguments of `throttle:max,minutes`.
    pub fn from_args(args: &[String], store: Arc<RateLimitStore>) -> Result<Self, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidArguments {
            id: "throttle".to_string(),
            reason,
        };
        let (max, minutes) = match args {
            [max] => (max.as_str(), "1"),
            [max, minutes] => (max.as_str(), minutes.as_str()),
            _ => return Err(invalid(format!("expected max,minutes, got {} arguments", args.len()))),
        };
        let max_attempts: u64 = max
            .parse()
            .map_err(|_| invalid(format!("max '{max}' is not a number")))?;
        let minutes: u64 = minutes
            .parse()
            .map_err(|_| invalid(format!("minutes '{minutes}' is not a number")))?;
        if max_attempts == 0 || minutes == 0 {
            return Err(invalid("max and minutes must be positive".to_string()));
        }
        let seconds = minutes
            .checked_mul(60)
            .ok_or_else(|| invalid(format!("window of {minutes} minutes is too long")))?;
        Ok(Self::new(max_attempts, Duration::from_secs(seconds), store))
    }

    /// Maximum requests per window.
    #[must_use]
    pub const fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    fn key(&self, ctx: &PipelineContext) -> String {
        let route = ctx
            .route_name()
            .or_else(|| ctx.route_pattern())
            .unwrap_or_else(|| ctx.request().path());
        let client = match ctx.user() {
            Some(user) => user.log_id(),
            None => ctx
                .request()
                .client_ip()
                .map_or_else(|| "unknown".to_string(), |ip| format!("ip:{ip}")),
        };
        format!("{route}|{client}")
    }
}

fn header(name: &'static str, value: u64) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from(value))
}

impl Middleware for ThrottleMiddleware {
    fn name(&self) -> &'static str {
        "throttle"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            let key = self.key(ctx);
            match self.store.hit(&key, self.max_attempts, self.window).await {
                RateLimitDecision::Allowed { limit, remaining } => {
                    let pending = ctx.response_headers_mut();
                    for (name, value) in [header(headers::LIMIT, limit), header(headers::REMAINING, remaining)] {
                        pending.insert(name, value);
                    }
                    next.run(ctx).await
                }
                RateLimitDecision::Limited { limit, reset_in } => {
                    let retry_after = reset_in.as_secs().max(1);
                    let reset_at = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs()
                        + retry_after;
                    debug!(request_id = %ctx.request_id(), key = %key, "rate limit exceeded");

                    let mut fault = MiddlewareFault::too_many_requests("Too Many Attempts.", retry_after);
                    for (name, value) in [
                        header(headers::LIMIT, limit),
                        header(headers::REMAINING, 0),
                        header(headers::RESET, reset_at),
                        header(headers::RESET_AFTER, retry_after),
                    ] {
                        fault = fault.with_header(name, value);
                    }
                    Err(fault.into())
                }
            }
        })
    }
}
