//! `verified`: requires an authenticated user with a verified email.
//!
//! Must run after `auth`; without a bound user the request is treated as
//! unauthenticated.

use portico_core::{ChainResult, MiddlewareFault};

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Middleware, Next};

/// The `verified` middleware.
#[derive(Debug, Clone, Default)]
pub struct VerifiedMiddleware {
    notice_path: Option<String>,
}

impl VerifiedMiddleware {
    /// Rejects unverified users with 403.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends unverified HTML clients to `path` instead.
    #[must_use]
    pub fn notice_path(mut self, path: impl Into<String>) -> Self {
        self.notice_path = Some(path.into());
        self
    }
}

impl Middleware for VerifiedMiddleware {
    fn name(&self) -> &'static str {
        "verified"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            let Some(user) = ctx.user() else {
                return Err(MiddlewareFault::unauthenticated("Unauthenticated.").into());
            };
            if !user.email_verified {
                let fault = MiddlewareFault::forbidden("Your email address is not verified.");
                let fault = match &self.notice_path {
                    Some(path) => fault.with_redirect(path.clone()),
                    None => fault,
                };
                return Err(fault.into());
            }
            next.run(ctx).await
        })
    }
}
