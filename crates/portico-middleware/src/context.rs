//! Per-request pipeline state.
//!
//! A [`PipelineContext`] is created by the kernel for exactly one request and
//! dropped once the response has been written. It owns the
//! [`InboundMessage`], the route parameters, the request scope and the
//! headers middleware want merged into the final response.

use http::header::HeaderMap;
use portico_core::{AuthUser, InboundMessage, RequestId, RequestScope};
use portico_router::Params;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::signal::DisconnectSignal;

/// Where a request is in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Chain built, nothing dispatched yet.
    Built,
    /// The position at the given index is running.
    Running(usize),
    /// A response was produced.
    Completed,
    /// The chain ended with a fault; an error response was rendered.
    Faulted,
    /// The client went away; no response is written.
    Aborted,
}

/// Context threaded through the middleware chain.
///
/// Never shared between requests.
///
/// # Example
///
/// ```
/// use portico_core::{Container, InboundMessage, Method};
/// use portico_middleware::PipelineContext;
/// use std::sync::Arc;
///
/// let container = Arc::new(Container::new());
/// let message = InboundMessage::builder(Method::Get, "/admin").build();
/// let mut ctx = PipelineContext::new(message, container.begin_scope());
///
/// #[derive(Debug, PartialEq)]
/// struct Breadcrumb(&'static str);
///
/// ctx.set_extension(Breadcrumb("Dashboard"));
/// assert_eq!(ctx.get_extension::<Breadcrumb>(), Some(&Breadcrumb("Dashboard")));
/// assert!(ctx.user().is_none());
/// ```
#[derive(Debug)]
pub struct PipelineContext {
    message: InboundMessage,
    params: Params,
    route_name: Option<String>,
    route_pattern: Option<String>,
    request_id: RequestId,
    scope: RequestScope,
    response_headers: HeaderMap,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    state: ExecutionState,
    cursor: usize,
    handler_done: bool,
    disconnect: DisconnectSignal,
    started_at: Instant,
}

impl PipelineContext {
    /// Creates a context with a fresh request id.
    #[must_use]
    pub fn new(message: InboundMessage, scope: RequestScope) -> Self {
        Self {
            message,
            params: Params::new(),
            route_name: None,
            route_pattern: None,
            request_id: RequestId::new(),
            scope,
            response_headers: HeaderMap::new(),
            extensions: HashMap::new(),
            state: ExecutionState::Built,
            cursor: 0,
            handler_done: false,
            disconnect: DisconnectSignal::new(),
            started_at: Instant::now(),
        }
    }

    /// Sets the matched route's parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the matched route's name.
    #[must_use]
    pub fn with_route_name(mut self, name: Option<String>) -> Self {
        self.route_name = name;
        self
    }

    /// Sets the matched route's normalized pattern.
    #[must_use]
    pub fn with_route_pattern(mut self, pattern: Option<String>) -> Self {
        self.route_pattern = pattern;
        self
    }

    /// Uses an existing request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Observes `signal` for client disconnects.
    #[must_use]
    pub fn with_disconnect(mut self, signal: DisconnectSignal) -> Self {
        self.disconnect = signal;
        self
    }

    /// The request.
    #[must_use]
    pub const fn request(&self) -> &InboundMessage {
        &self.message
    }

    /// Route parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// A single route parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Name of the matched route.
    #[must_use]
    pub fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }

    /// Pattern of the matched route, such as `/resources/{id}`.
    #[must_use]
    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    /// Request id.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Replaces the request id.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Request-scoped bindings.
    #[must_use]
    pub const fn scope(&self) -> &RequestScope {
        &self.scope
    }

    /// Request-scoped bindings, mutably.
    pub fn scope_mut(&mut self) -> &mut RequestScope {
        &mut self.scope
    }

    /// The user bound by `auth`, if any.
    #[must_use]
    pub fn user(&self) -> Option<Arc<AuthUser>> {
        self.scope.get::<AuthUser>()
    }

    /// Headers merged into whatever response the chain produces,
    /// error responses included.
    #[must_use]
    pub const fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Pending response headers, mutably.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response_headers)
    }

    /// Stores a typed extension.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// A typed extension.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// `true` if an extension of type `T` is stored.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Execution state.
    #[must_use]
    pub const fn state(&self) -> ExecutionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
    }

    /// `true` once the route handler has returned.
    #[must_use]
    pub const fn handler_done(&self) -> bool {
        self.handler_done
    }

    /// Claims position `index`; `false` if it already ran.
    pub(crate) fn enter(&mut self, index: usize) -> bool {
        if index < self.cursor || self.handler_done {
            return false;
        }
        self.cursor = index + 1;
        self.state = ExecutionState::Running(index);
        true
    }

    pub(crate) fn mark_handler_done(&mut self) {
        self.handler_done = true;
    }

    /// The disconnect signal for this request.
    #[must_use]
    pub const fn disconnect_signal(&self) -> &DisconnectSignal {
        &self.disconnect
    }

    /// `true` once the client has gone away.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_triggered()
    }

    /// When the context was created.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Consumes the context, returning the request.
    #[must_use]
    pub fn into_message(self) -> InboundMessage {
        self.message
    }
}
