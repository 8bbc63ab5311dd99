//! Request ID middleware.
//!
//! Assigns every request an identifier used in log lines and error
//! envelopes, and echoes it in the `X-Request-ID` response header.
//!
//! 1. **X-Request-ID header**: used when incoming ids are trusted and the
//!    value is a UUID
//! 2. **Generated UUID v7**: otherwise the id created with the context is kept

use http::HeaderValue;
use portico_core::{ChainResult, RequestId};

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Middleware, Next};

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware that propagates request IDs.
///
/// The header is queued in the context's pending response headers, so it
/// also reaches error responses rendered after a fault.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    /// Whether to trust incoming `X-Request-ID` headers.
    ///
    /// Enable only behind a proxy that sets or strips the header.
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a middleware that always keeps the generated id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a middleware that adopts incoming `X-Request-ID` values.
    #[must_use]
    pub const fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn incoming(&self, ctx: &PipelineContext) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }
        ctx.request().header(REQUEST_ID_HEADER).and_then(RequestId::parse)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            if let Some(id) = self.incoming(ctx) {
                ctx.set_request_id(id);
            }

            if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
                ctx.response_headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            next.run(ctx).await
        })
    }
}
