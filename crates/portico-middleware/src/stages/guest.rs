//! `guest`: pages only anonymous visitors should see, such as the login
//! form. Authenticated users are redirected home.

use std::sync::Arc;

use portico_core::{ChainResult, OutboundMessage};

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::auth::{resolve_user, SessionStore, DEFAULT_SESSION_COOKIE};

/// The `guest` middleware.
#[derive(Clone)]
pub struct GuestMiddleware {
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
    home_path: String,
}

impl GuestMiddleware {
    /// Redirects authenticated users to `home_path`.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, home_path: impl Into<String>) -> Self {
        Self {
            sessions,
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            home_path: home_path.into(),
        }
    }

    /// Reads the session id from `name`.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }
}

impl std::fmt::Debug for GuestMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestMiddleware")
            .field("cookie_name", &self.cookie_name)
            .field("home_path", &self.home_path)
            .finish_non_exhaustive()
    }
}

impl Middleware for GuestMiddleware {
    fn name(&self) -> &'static str {
        "guest"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            if resolve_user(ctx, self.sessions.as_ref(), &self.cookie_name)
                .await?
                .is_some()
            {
                return Ok(OutboundMessage::redirect(&self.home_path));
            }
            next.run(ctx).await
        })
    }
}
