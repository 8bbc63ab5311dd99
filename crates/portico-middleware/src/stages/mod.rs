//! Built-in middleware.
//!
//! | Identifier | Middleware | Purpose |
//! |---|---|---|
//! | `request_id` | [`RequestIdMiddleware`] | Assign and echo `X-Request-ID` |
//! | `auth` | [`AuthMiddleware`] | Require a session, bind [`AuthUser`](portico_core::AuthUser) |
//! | `guest` | [`GuestMiddleware`] | Redirect signed-in users away |
//! | `throttle:max,minutes` | [`ThrottleMiddleware`] | Fixed-window rate limit |
//! | `verified` | [`VerifiedMiddleware`] | Require a verified email |
//!
//! [`Builtins::install`] registers all of them under those identifiers.

pub mod auth;
pub mod guest;
pub mod request_id;
pub mod throttle;
pub mod verified;

use std::sync::Arc;

use portico_core::Container;

pub use auth::{AuthMiddleware, InMemorySessionStore, SessionStore, DEFAULT_SESSION_COOKIE};
pub use guest::GuestMiddleware;
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use throttle::{RateLimitDecision, RateLimitStore, ThrottleMiddleware};
pub use verified::VerifiedMiddleware;

use crate::registry::MiddlewareRegistry;

/// Settings for the built-in middleware.
#[derive(Clone)]
pub struct Builtins {
    sessions: Arc<dyn SessionStore>,
    rate_limits: Arc<RateLimitStore>,
    cookie_name: String,
    login_path: Option<String>,
    home_path: String,
    verify_notice_path: Option<String>,
    trust_request_id: bool,
}

impl Builtins {
    /// Built-ins authenticating against `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions,
            rate_limits: Arc::new(RateLimitStore::new()),
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            login_path: None,
            home_path: "/".to_string(),
            verify_notice_path: None,
            trust_request_id: false,
        }
    }

    /// Session cookie name.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Login page for unauthenticated HTML clients.
    #[must_use]
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    /// Where `guest` sends signed-in users.
    #[must_use]
    pub fn home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    /// Where `verified` sends unverified HTML clients.
    #[must_use]
    pub fn verify_notice_path(mut self, path: impl Into<String>) -> Self {
        self.verify_notice_path = Some(path.into());
        self
    }

    /// Adopt incoming `X-Request-ID` values.
    #[must_use]
    pub const fn trust_request_id(mut self, trust: bool) -> Self {
        self.trust_request_id = trust;
        self
    }

    /// Uses an existing rate limit store.
    #[must_use]
    pub fn rate_limits(mut self, store: Arc<RateLimitStore>) -> Self {
        self.rate_limits = store;
        self
    }

    /// Registers every built-in into `registry` and publishes the rate
    /// limit store as a process singleton in `container`.
    pub fn install(self, registry: &mut MiddlewareRegistry, container: &mut Container) {
        container.register(Arc::clone(&self.rate_limits));

        let request_id = if self.trust_request_id {
            RequestIdMiddleware::trust_incoming()
        } else {
            RequestIdMiddleware::new()
        };

        let mut auth =
            AuthMiddleware::new(Arc::clone(&self.sessions)).cookie_name(self.cookie_name.clone());
        if let Some(path) = &self.login_path {
            auth = auth.login_path(path.clone());
        }

        let guest = GuestMiddleware::new(Arc::clone(&self.sessions), self.home_path.clone())
            .cookie_name(self.cookie_name.clone());

        let mut verified = VerifiedMiddleware::new();
        if let Some(path) = &self.verify_notice_path {
            verified = verified.notice_path(path.clone());
        }

        let rate_limits = self.rate_limits;
        registry
            .register("request_id", request_id)
            .register("auth", auth)
            .register("guest", guest)
            .register("verified", verified)
            .register_with("throttle", move |args: &[String]| {
                ThrottleMiddleware::from_args(args, Arc::clone(&rate_limits))
            });
    }
}

impl std::fmt::Debug for Builtins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtins")
            .field("cookie_name", &self.cookie_name)
            .field("login_path", &self.login_path)
            .field("home_path", &self.home_path)
            .field("verify_notice_path", &self.verify_notice_path)
            .field("trust_request_id", &self.trust_request_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_registers_identifiers() {
        let mut registry = MiddlewareRegistry::new();
        let mut container = Container::new();
        Builtins::new(Arc::new(InMemorySessionStore::new())).install(&mut registry, &mut container);

        assert_eq!(
            registry.ids(),
            ["auth", "guest", "request_id", "throttle", "verified"]
        );
        assert!(container.resolve::<RateLimitStore>().is_some());
        assert!(registry
            .validate(&["auth".into(), "throttle:60,1".into(), "verified".into()])
            .is_ok());
        assert!(registry.validate(&["throttle".into()]).is_err());
    }
}
