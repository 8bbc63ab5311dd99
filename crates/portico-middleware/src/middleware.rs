//! The middleware and handler traits, and the [`Next`] continuation.
//!
//! A request runs through an onion of middleware ending in a handler. Each
//! middleware receives the request context and a [`Next`] value pointing at
//! the rest of the chain. It may:
//!
//! - short-circuit by returning a response or fault without calling `next`
//! - call `next.run(ctx)` and post-process what comes back
//! - pass through by returning `next.run(ctx).await` unchanged
//!
//! Every position in the chain runs at most once per request. Calling `next`
//! a second time fails with [`PipelineError::IndexOutOfBounds`].
//!
//! # Example
//!
//! ```ignore
//! use portico_middleware::{BoxFuture, Middleware, Next, PipelineContext};
//! use portico_core::ChainResult;
//!
//! struct NoStore;
//!
//! impl Middleware for NoStore {
//!     fn name(&self) -> &'static str {
//!         "no_store"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: &'a mut PipelineContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ChainResult> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx).await?;
//!             response.headers_mut().insert(
//!                 http::header::CACHE_CONTROL,
//!                 http::HeaderValue::from_static("no-store"),
//!             );
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use portico_core::{ChainResult, Fault, OutboundMessage, PipelineError};
use std::future::Future;
use std::pin::Pin;

use crate::context::PipelineContext;
use crate::pipeline::Stage;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A layer of the request onion.
///
/// Implementations registered as shared instances serve every request
/// concurrently through `&self`; request data belongs in the
/// [`PipelineContext`], never in the middleware.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, usually delegating to `next`.
    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult>;

    /// Runs after the response has been produced.
    ///
    /// Route middleware terminate before global middleware. The response
    /// can no longer be changed.
    fn terminate<'a>(
        &'a self,
        _ctx: &'a PipelineContext,
        _response: &'a OutboundMessage,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// The innermost layer: produces the response for a matched route.
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    fn call<'a>(&'a self, ctx: &'a mut PipelineContext) -> BoxFuture<'a, ChainResult>;
}

/// A [`Handler`] built from a closure.
///
/// The closure reads what it needs from the context synchronously and
/// returns a `'static` future.
///
/// ```ignore
/// let show = handler_fn(|ctx| {
///     let id = ctx.param("id").unwrap_or_default().to_string();
///     async move { Ok(OutboundMessage::text(StatusCode::OK, id)) }
/// });
/// ```
pub struct FnHandler<F> {
    func: F,
}

/// Wraps a closure as a [`Handler`].
pub const fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(&mut PipelineContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ChainResult> + Send + 'static,
{
    FnHandler { func }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(&mut PipelineContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ChainResult> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut PipelineContext) -> BoxFuture<'a, ChainResult> {
        Box::pin((self.func)(ctx))
    }
}

/// A middleware instance in a request's chain.
pub(crate) enum Layer<'p> {
    /// A shared instance owned by the pipeline.
    Shared(&'p dyn Middleware),
    /// An instance built for this request only.
    Owned(Box<dyn Middleware>),
}

impl Layer<'_> {
    pub(crate) fn get(&self) -> &dyn Middleware {
        match self {
            Self::Shared(m) => *m,
            Self::Owned(m) => m.as_ref(),
        }
    }
}

/// The instantiated chain for one request.
pub(crate) struct Chain<'p> {
    pub(crate) layers: Vec<(Stage, Layer<'p>)>,
    pub(crate) handler: &'p dyn Handler,
}

impl Chain<'_> {
    /// Number of positions, handler included.
    pub(crate) fn len(&self) -> usize {
        self.layers.len() + 1
    }
}

/// Continuation to the rest of the chain.
///
/// `Next` is a position in the request's chain. Running it dispatches the
/// middleware at that position, or the handler once the middleware are
/// exhausted.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a Chain<'a>,
    index: usize,
}

impl<'a> Next<'a> {
    pub(crate) const fn start(chain: &'a Chain<'a>) -> Self {
        Self { chain, index: 0 }
    }

    /// Position this continuation dispatches.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Runs the rest of the chain.
    ///
    /// Fails with [`Fault::Aborted`] once the client has disconnected, and
    /// with [`PipelineError::IndexOutOfBounds`] when this position already
    /// ran.
    pub async fn run(self, ctx: &mut PipelineContext) -> ChainResult {
        let len = self.chain.len();
        if ctx.is_disconnected() {
            return Err(Fault::Aborted);
        }
        if self.index >= len || !ctx.enter(self.index) {
            return Err(PipelineError::IndexOutOfBounds {
                index: self.index,
                len,
            }
            .into());
        }

        match self.chain.layers.get(self.index) {
            Some((_, layer)) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                };
                layer.get().handle(ctx, next).await
            }
            None => {
                let result = self.chain.handler.call(ctx).await;
                ctx.mark_handler_done();
                result
            }
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.chain.len())
            .finish()
    }
}
