//! Runs a request through its pipeline.

use http::header::HeaderMap;
use portico_core::{Fault, FaultCategory, OutboundMessage};
use tracing::{debug, error};

use crate::context::{ExecutionState, PipelineContext};
use crate::middleware::Next;
use crate::pipeline::{Pipeline, Stage};
use crate::render::ErrorRenderer;

/// Drives a [`Pipeline`] for one request at a time.
///
/// Stateless apart from its renderer; one executor serves every request.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    renderer: ErrorRenderer,
}

impl Executor {
    /// Creates an executor that renders faults with `renderer`.
    #[must_use]
    pub const fn new(renderer: ErrorRenderer) -> Self {
        Self { renderer }
    }

    /// The renderer used for faults.
    #[must_use]
    pub const fn renderer(&self) -> &ErrorRenderer {
        &self.renderer
    }

    /// Runs the chain and returns the response to write.
    ///
    /// Faults are rendered into error responses, so this always yields a
    /// well-formed message unless the client disconnected, in which case
    /// the remaining chain is dropped and `None` is returned.
    ///
    /// After a response exists, `terminate` hooks run: route and group
    /// middleware first, then global middleware.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        ctx: &mut PipelineContext,
    ) -> Option<OutboundMessage> {
        let chain = pipeline.instantiate();
        let disconnect = ctx.disconnect_signal().clone();

        let result = tokio::select! {
            biased;
            () = disconnect.triggered() => Err(Fault::Aborted),
            result = Next::start(&chain).run(ctx) => result,
        };

        let mut response = match result {
            Ok(response) => {
                ctx.set_state(ExecutionState::Completed);
                response
            }
            Err(Fault::Aborted) => {
                ctx.set_state(ExecutionState::Aborted);
                debug!(
                    request_id = %ctx.request_id(),
                    route = ctx.route_name().unwrap_or("-"),
                    "client disconnected, chain aborted"
                );
                return None;
            }
            Err(Fault::Pipeline(err)) => {
                ctx.set_state(ExecutionState::Faulted);
                error!(
                    request_id = %ctx.request_id(),
                    route = ctx.route_name().unwrap_or("-"),
                    error.code = err.code(),
                    error = %err,
                    "pipeline error"
                );
                self.renderer
                    .render_pipeline_error(&err, ctx.request().headers(), ctx.request_id())
            }
            Err(Fault::Middleware(fault)) => {
                ctx.set_state(ExecutionState::Faulted);
                if fault.category() == FaultCategory::Internal {
                    error!(
                        request_id = %ctx.request_id(),
                        route = ctx.route_name().unwrap_or("-"),
                        error = ?fault,
                        "request failed"
                    );
                } else {
                    debug!(
                        request_id = %ctx.request_id(),
                        route = ctx.route_name().unwrap_or("-"),
                        category = %fault.category(),
                        message = fault.message(),
                        "request rejected"
                    );
                }
                self.renderer
                    .render_fault(&fault, ctx.request().headers(), ctx.request_id())
            }
        };

        merge_pending(response.headers_mut(), ctx.take_response_headers());

        for phase in [Stage::RouteAfter, Stage::GlobalAfter] {
            for (stage, layer) in &chain.layers {
                if stage.after() == phase {
                    layer.get().terminate(ctx, &response).await;
                }
            }
        }

        Some(response)
    }
}

/// Copies headers that the response does not already set.
fn merge_pending(target: &mut HeaderMap, pending: HeaderMap) {
    for name in pending.keys() {
        if target.contains_key(name) {
            continue;
        }
        for value in pending.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}
