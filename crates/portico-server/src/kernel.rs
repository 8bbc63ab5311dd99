//! The request kernel.
//!
//! One request, start to finish:
//!
//! 1. translate the runtime request into an [`InboundMessage`]
//! 2. match it against the published [`Routing`]
//! 3. run the route's pipeline in a fresh [`PipelineContext`]
//! 4. translate the response back for the runtime
//!
//! Routes and pipelines are published through an [`ArcSwap`]. A reload
//! compiles a complete new [`Routing`] and swaps it in only if every route's
//! middleware resolves; requests already running keep the generation they
//! started with.
//!
//! [`InboundMessage`]: portico_core::InboundMessage

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwap;
use http::StatusCode;
use portico_core::negotiate::negotiate;
use portico_core::{Container, Method, OutboundMessage, RequestId, TranslationError};
use portico_middleware::{
    Builtins, DisconnectSignal, ErrorRenderer, Executor, Handler, MiddlewareRegistry, Pipeline,
    PipelineContext,
};
use portico_router::{RouteSnapshot, RouteTable};
use portico_telemetry::metrics::{self, InFlightGuard, UNMATCHED_ROUTE};
use portico_translate::{empty_body, RawRequest, ResponseBody, Translator, TranslatorConfig};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::ReloadError;

/// A route handler as registered.
pub type HandlerRef = Arc<dyn Handler>;

/// One published generation of routes and their compiled pipelines.
pub struct Routing {
    routes: RouteTable<HandlerRef>,
    registry: Arc<MiddlewareRegistry>,
    pipelines: RouteTable<Pipeline>,
    generation: u64,
}

impl Routing {
    /// Builds a pipeline for every route.
    ///
    /// # Errors
    ///
    /// Returns the first route (or the global list) whose middleware does
    /// not resolve.
    pub fn compile(
        routes: RouteTable<HandlerRef>,
        registry: Arc<MiddlewareRegistry>,
        generation: u64,
    ) -> Result<Self, ReloadError> {
        registry.validate(&[]).map_err(ReloadError::Global)?;

        let pipelines = routes.clone().try_map(|route| {
            registry
                .build(route.middleware(), Arc::clone(route.handler()))
                .map_err(|source| ReloadError::Pipeline {
                    route: route.label(),
                    source,
                })
        })?;

        Ok(Self {
            routes,
            registry,
            pipelines,
            generation,
        })
    }

    /// Routes as registered.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable<HandlerRef> {
        &self.routes
    }

    /// Routes with their compiled pipelines.
    #[must_use]
    pub const fn pipelines(&self) -> &RouteTable<Pipeline> {
        &self.pipelines
    }

    /// The registry the pipelines were built from.
    #[must_use]
    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// Starts at 1 and increases with every successful reload.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The route listing.
    #[must_use]
    pub fn listing(&self) -> RouteListing {
        RouteListing {
            count: self.routes.len(),
            routes: self.routes.snapshot(),
        }
    }
}

impl std::fmt::Debug for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routing")
            .field("routes", &self.routes.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Route count and summaries, as served by the diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteListing {
    /// Number of routes, fallback included.
    pub count: usize,
    /// Routes in match order.
    pub routes: Vec<RouteSnapshot>,
}

/// Translates, routes and executes requests.
pub struct Kernel {
    translator: Translator,
    executor: Executor,
    container: Arc<Container>,
    routing: ArcSwap<Routing>,
    reload_lock: Mutex<()>,
    diagnostics_path: Option<String>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("routing", &self.routing.load())
            .field("diagnostics_path", &self.diagnostics_path)
            .finish_non_exhaustive()
    }
}

struct Completion<'a> {
    request_id: RequestId,
    method: Method,
    path: &'a str,
    route: &'a str,
    started: Instant,
}

impl Kernel {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    /// The live routing generation.
    #[must_use]
    pub fn routing(&self) -> Arc<Routing> {
        self.routing.load_full()
    }

    /// The translator.
    #[must_use]
    pub const fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Process singletons.
    #[must_use]
    pub const fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Replaces the routes, keeping the middleware registry.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError` and keeps the current routing if any route
    /// fails to compile.
    pub fn reload_routes(&self, routes: RouteTable<HandlerRef>) -> Result<u64, ReloadError> {
        self.publish(|current| Routing::compile(routes, Arc::clone(&current.registry), current.generation + 1))
    }

    /// Replaces the middleware registry, keeping the routes.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError` and keeps the current routing if any route
    /// fails to compile.
    pub fn reload_middleware(&self, registry: MiddlewareRegistry) -> Result<u64, ReloadError> {
        self.publish(|current| {
            Routing::compile(current.routes.clone(), Arc::new(registry), current.generation + 1)
        })
    }

    fn publish<F>(&self, compile: F) -> Result<u64, ReloadError>
    where
        F: FnOnce(&Routing) -> Result<Routing, ReloadError>,
    {
        let _lock = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.routing.load_full();
        match compile(&current) {
            Ok(next) => {
                let generation = next.generation;
                info!(generation, routes = next.routes.len(), "routing reloaded");
                self.routing.store(Arc::new(next));
                metrics::record_reload(true);
                Ok(generation)
            }
            Err(err) => {
                error!(
                    generation = current.generation,
                    error = %err,
                    "routing reload rejected, keeping current generation"
                );
                metrics::record_reload(false);
                Err(err)
            }
        }
    }

    /// Handles one request.
    ///
    /// Returns `None` if `disconnect` fired before a response existed; there
    /// is nothing to write in that case.
    pub async fn handle(
        &self,
        raw: RawRequest,
        disconnect: DisconnectSignal,
    ) -> Option<http::Response<ResponseBody>> {
        let _in_flight = InFlightGuard::new();
        let started = Instant::now();
        let routing = self.routing.load_full();
        let method = Method::try_from(raw.request.method()).unwrap_or(Method::Get);
        let path = raw.request.uri().path().to_string();

        if let Some(listing) = self.diagnostics(&raw, &routing) {
            return Some(self.finish(
                listing,
                &Completion {
                    request_id: RequestId::new(),
                    method,
                    path: &path,
                    route: "diagnostics",
                    started,
                },
            ));
        }

        let message = match self.translator.inbound(&raw).await {
            Ok(message) => message,
            Err(err) => {
                let request_id = RequestId::new();
                debug!(
                    request_id = %request_id,
                    http.method = %raw.request.method(),
                    http.path = %path,
                    error = %err,
                    "request rejected during translation"
                );
                let response = self.executor.renderer().render_translation_error(
                    &err,
                    raw.request.headers(),
                    request_id,
                );
                return Some(self.finish(
                    response,
                    &Completion {
                        request_id,
                        method,
                        path: &path,
                        route: UNMATCHED_ROUTE,
                        started,
                    },
                ));
            }
        };
        drop(raw);

        let matched = match routing.pipelines().match_route(message.method(), message.path()) {
            Ok(matched) => matched,
            Err(err) => {
                let request_id = RequestId::new();
                debug!(request_id = %request_id, http.path = %path, "no route matched");
                let response = self.executor.renderer().render_not_found(
                    &err.to_string(),
                    message.headers(),
                    request_id,
                );
                return Some(self.finish(
                    response,
                    &Completion {
                        request_id,
                        method,
                        path: &path,
                        route: UNMATCHED_ROUTE,
                        started,
                    },
                ));
            }
        };

        let route = matched.route;
        let label = route.label();
        let mut ctx = PipelineContext::new(message, self.container.begin_scope())
            .with_params(matched.params)
            .with_route_name(route.name().map(String::from))
            .with_route_pattern(Some(route.pattern().as_str().to_string()))
            .with_disconnect(disconnect);

        let Some(response) = self.executor.execute(route.handler(), &mut ctx).await else {
            metrics::record_aborted(&label);
            return None;
        };

        let completion = Completion {
            request_id: ctx.request_id(),
            method,
            path: &path,
            route: &label,
            started,
        };
        let runtime = match self.translator.outbound(response, method) {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(
                    request_id = %completion.request_id,
                    route = %label,
                    error = %err,
                    "response could not be translated"
                );
                let rendered = self.executor.renderer().render_translation_error(
                    &err,
                    ctx.request().headers(),
                    completion.request_id,
                );
                return Some(self.finish(rendered, &completion));
            }
        };
        Some(self.log_completion(runtime, &completion))
    }

    /// The response for a request that ran past its deadline.
    ///
    /// The request's own pipeline has already been dropped at this point.
    #[must_use]
    pub fn timeout_response(
        &self,
        method: &http::Method,
        request_headers: &http::HeaderMap,
    ) -> http::Response<ResponseBody> {
        let request_id = RequestId::new();
        let message = self.executor.renderer().render(
            negotiate(request_headers),
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            "the request took too long to complete",
            request_id,
        );
        self.early_response(message, method, request_id)
    }

    /// The response for a request rejected before it reached the kernel,
    /// such as a body that outgrew the size limit while being read.
    #[must_use]
    pub fn reject(
        &self,
        err: &TranslationError,
        method: &http::Method,
        request_headers: &http::HeaderMap,
    ) -> http::Response<ResponseBody> {
        let request_id = RequestId::new();
        let message = self
            .executor
            .renderer()
            .render_translation_error(err, request_headers, request_id);
        self.early_response(message, method, request_id)
    }

    fn early_response(
        &self,
        message: OutboundMessage,
        method: &http::Method,
        request_id: RequestId,
    ) -> http::Response<ResponseBody> {
        let status = message.status();
        let method = Method::try_from(method).unwrap_or(Method::Get);
        self.translator.outbound(message, method).unwrap_or_else(|err| {
            error!(request_id = %request_id, error = %err, "error response could not be translated");
            let mut fallback = http::Response::new(empty_body());
            *fallback.status_mut() = status;
            fallback
        })
    }

    fn diagnostics(&self, raw: &RawRequest, routing: &Routing) -> Option<OutboundMessage> {
        let target = self.diagnostics_path.as_deref()?;
        let method = raw.request.method();
        if raw.request.uri().path() != target
            || !(method == http::Method::GET || method == http::Method::HEAD)
        {
            return None;
        }
        let listing = routing.listing();
        Some(
            OutboundMessage::json(StatusCode::OK, &listing)
                .unwrap_or_else(|_| OutboundMessage::new(StatusCode::INTERNAL_SERVER_ERROR)),
        )
    }

    fn finish(
        &self,
        response: OutboundMessage,
        completion: &Completion<'_>,
    ) -> http::Response<ResponseBody> {
        let runtime = self
            .translator
            .outbound(response, completion.method)
            .unwrap_or_else(|err| {
                error!(request_id = %completion.request_id, error = %err, "error response could not be translated");
                let mut fallback = http::Response::new(empty_body());
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            });
        self.log_completion(runtime, completion)
    }

    fn log_completion(
        &self,
        response: http::Response<ResponseBody>,
        completion: &Completion<'_>,
    ) -> http::Response<ResponseBody> {
        let elapsed = completion.started.elapsed();
        let status = response.status().as_u16();
        info!(
            request_id = %completion.request_id,
            http.method = %completion.method,
            http.path = %completion.path,
            route = %completion.route,
            http.status_code = status,
            duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        metrics::record_request(completion.route, status, elapsed);
        response
    }
}

/// Builder for [`Kernel`].
pub struct KernelBuilder {
    translator: TranslatorConfig,
    renderer: ErrorRenderer,
    container: Container,
    registry: MiddlewareRegistry,
    routes: RouteTable<HandlerRef>,
    diagnostics_path: Option<String>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self {
            translator: TranslatorConfig::default(),
            renderer: ErrorRenderer::default(),
            container: Container::new(),
            registry: MiddlewareRegistry::new(),
            routes: RouteTable::new(),
            diagnostics_path: None,
        }
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("translator", &self.translator)
            .field("renderer", &self.renderer)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl KernelBuilder {
    /// Translator limits.
    #[must_use]
    pub fn translator(mut self, config: TranslatorConfig) -> Self {
        self.translator = config;
        self
    }

    /// Error renderer.
    #[must_use]
    pub fn renderer(mut self, renderer: ErrorRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Installs the built-in middleware.
    #[must_use]
    pub fn builtins(mut self, builtins: Builtins) -> Self {
        builtins.install(&mut self.registry, &mut self.container);
        self
    }

    /// Registers middleware, groups and process singletons.
    #[must_use]
    pub fn middleware<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut MiddlewareRegistry, &mut Container),
    {
        configure(&mut self.registry, &mut self.container);
        self
    }

    /// The route table.
    #[must_use]
    pub fn routes(mut self, routes: RouteTable<HandlerRef>) -> Self {
        self.routes = routes;
        self
    }

    /// Serves the route listing as JSON at `path`.
    #[must_use]
    pub fn route_diagnostics(mut self, path: impl Into<String>) -> Self {
        self.diagnostics_path = Some(path.into());
        self
    }

    /// Compiles the first routing generation.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError` if any route's middleware does not resolve.
    pub fn build(self) -> Result<Kernel, ReloadError> {
        let routing = Routing::compile(self.routes, Arc::new(self.registry), 1)?;
        info!(routes = routing.routes.len(), "routing compiled");

        Ok(Kernel {
            translator: Translator::new(self.translator),
            executor: Executor::new(self.renderer),
            container: Arc::new(self.container),
            routing: ArcSwap::from_pointee(routing),
            reload_lock: Mutex::new(()),
            diagnostics_path: self.diagnostics_path,
        })
    }
}
