//! Session authentication.
//!
//! `auth` reads the session cookie, resolves it through a [`SessionStore`]
//! and binds the resulting [`AuthUser`] into the request scope. Requests
//! without a valid session are rejected as unauthenticated; HTML clients
//! are redirected to the login page when one is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use portico_core::{AuthUser, ChainResult, MiddlewareFault};
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Default name of the session cookie.
pub const DEFAULT_SESSION_COOKIE: &str = "portico_session";

/// Looks sessions up by id.
///
/// Implemented by the embedding application over its session backend.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// The user owning `session_id`, or `None` for unknown and expired
    /// sessions.
    async fn find(&self, session_id: &str) -> anyhow::Result<Option<AuthUser>>;
}

/// A [`SessionStore`] held in memory. Useful for tests and single-node
/// development servers.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, AuthUser>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session for `user`.
    pub async fn insert(&self, session_id: impl Into<String>, user: AuthUser) {
        self.sessions.write().await.insert(session_id.into(), user);
    }

    /// Ends a session.
    pub async fn remove(&self, session_id: &str) -> Option<AuthUser> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// `true` if there are no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find(&self, session_id: &str) -> anyhow::Result<Option<AuthUser>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }
}

/// Resolves the session user, binding it into the request scope.
///
/// Returns `Ok(None)` when the request carries no session or an unknown
/// one. Shared by `auth` and `guest`.
pub(crate) async fn resolve_user(
    ctx: &mut PipelineContext,
    sessions: &dyn SessionStore,
    cookie_name: &str,
) -> Result<Option<Arc<AuthUser>>, MiddlewareFault> {
    if let Some(user) = ctx.user() {
        return Ok(Some(user));
    }
    let Some(session_id) = ctx.request().cookie(cookie_name).map(str::to_owned) else {
        return Ok(None);
    };

    match sessions.find(&session_id).await {
        Ok(Some(user)) => {
            ctx.scope_mut().bind(user);
            Ok(ctx.user())
        }
        Ok(None) => {
            debug!(request_id = %ctx.request_id(), "unknown session");
            Ok(None)
        }
        Err(err) => Err(MiddlewareFault::internal_with_source(
            "session lookup failed",
            err,
        )),
    }
}

/// The `auth` middleware.
#[derive(Clone)]
pub struct AuthMiddleware {
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
    login_path: Option<String>,
}

impl AuthMiddleware {
    /// Authenticates against `sessions` using the default cookie.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions,
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            login_path: None,
        }
    }

    /// Reads the session id from `name`.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Where HTML clients go when unauthenticated.
    #[must_use]
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    fn unauthenticated(&self) -> MiddlewareFault {
        let fault = MiddlewareFault::unauthenticated("Unauthenticated.");
        match &self.login_path {
            Some(path) => fault.with_redirect(path.clone()),
            None => fault,
        }
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("cookie_name", &self.cookie_name)
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            match resolve_user(ctx, self.sessions.as_ref(), &self.cookie_name).await? {
                Some(_) => next.run(ctx).await,
                None => Err(self.unauthenticated().into()),
            }
        })
    }
}
