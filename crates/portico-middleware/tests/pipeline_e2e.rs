//! End-to-end pipeline tests.
//!
//! These build real pipelines through the registry and run them with the
//! executor, checking the onion order, short-circuits, continuation misuse,
//! terminate hooks, per-request factories and disconnects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::header::ACCEPT;
use http::{HeaderValue, StatusCode};
use portico_core::{
    AuthUser, ChainResult, Container, InboundMessage, Method, MiddlewareFault, OutboundMessage,
};
use portico_middleware::stages::InMemorySessionStore;
use portico_middleware::{
    handler_fn, BoxFuture, Builtins, DisconnectSignal, ExecutionState, Executor, Handler,
    Middleware, MiddlewareRegistry, Next, PipelineContext,
};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct Recorder {
    label: &'static str,
    journal: Journal,
}

impl Middleware for Recorder {
    fn name(&self) -> &'static str {
        self.label
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            self.journal.push(format!("{}:before", self.label));
            let result = next.run(ctx).await;
            self.journal.push(format!("{}:after", self.label));
            result
        })
    }

    fn terminate<'a>(&'a self, _ctx: &'a PipelineContext, _response: &'a OutboundMessage) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.journal.push(format!("{}:terminate", self.label));
        })
    }
}

struct ShortCircuit {
    journal: Journal,
}

impl Middleware for ShortCircuit {
    fn name(&self) -> &'static str {
        "short"
    }

    fn handle<'a>(&'a self, _ctx: &'a mut PipelineContext, _next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            self.journal.push("B:short");
            Ok(OutboundMessage::text(StatusCode::FORBIDDEN, "blocked"))
        })
    }
}

struct CallsNextTwice;

impl Middleware for CallsNextTwice {
    fn name(&self) -> &'static str {
        "twice"
    }

    fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            let _first = next.run(ctx).await?;
            next.run(ctx).await
        })
    }
}

fn recording_handler(journal: &Journal) -> Arc<dyn Handler> {
    let journal = journal.clone();
    Arc::new(handler_fn(move |_ctx| {
        journal.push("handler");
        async { Ok(OutboundMessage::text(StatusCode::OK, "dashboard")) }
    }))
}

fn context(message: InboundMessage) -> PipelineContext {
    PipelineContext::new(message, Arc::new(Container::new()).begin_scope())
}

fn get(path: &str) -> InboundMessage {
    InboundMessage::builder(Method::Get, path).build()
}

fn get_json(path: &str) -> InboundMessage {
    InboundMessage::builder(Method::Get, path)
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .build()
}

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn body_text(response: &OutboundMessage) -> String {
    String::from_utf8(response.body().as_bytes().unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn test_short_circuit_unwinds_through_outer_layers() {
    let journal = Journal::default();
    let mut registry = MiddlewareRegistry::new();
    registry
        .register("a", Recorder { label: "A", journal: journal.clone() })
        .register("b", ShortCircuit { journal: journal.clone() });

    let pipeline = registry.build(&ids(&["a", "b"]), recording_handler(&journal)).unwrap();
    let mut ctx = context(get("/admin"));
    let response = Executor::default().execute(&pipeline, &mut ctx).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        journal.entries(),
        ["A:before", "B:short", "A:after", "A:terminate"]
    );
    assert!(!ctx.handler_done());
    assert_eq!(ctx.state(), ExecutionState::Completed);
}

#[tokio::test]
async fn test_pass_through_reaches_handler() {
    let journal = Journal::default();
    let mut registry = MiddlewareRegistry::new();
    registry
        .register("a", Recorder { label: "A", journal: journal.clone() })
        .register("b", Recorder { label: "B", journal: journal.clone() });

    let pipeline = registry.build(&ids(&["a", "b"]), recording_handler(&journal)).unwrap();
    let mut ctx = context(get("/admin"));
    let response = Executor::default().execute(&pipeline, &mut ctx).await.unwrap();

    assert_eq!(body_text(&response), "dashboard");
    assert_eq!(
        journal.entries(),
        [
            "A:before",
            "B:before",
            "handler",
            "B:after",
            "A:after",
            "A:terminate",
            "B:terminate"
        ]
    );
    assert!(ctx.handler_done());
}

#[tokio::test]
async fn test_calling_next_after_handler_is_a_pipeline_error() {
    let journal = Journal::default();
    let mut registry = MiddlewareRegistry::new();
    registry.register("twice", CallsNextTwice);

    let pipeline = registry.build(&ids(&["twice"]), recording_handler(&journal)).unwrap();
    let mut ctx = context(get_json("/admin"));
    let response = Executor::default().execute(&pipeline, &mut ctx).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_text(&response)).unwrap();
    assert_eq!(body["error"]["code"], "PIPELINE_INDEX_OUT_OF_BOUNDS");
    assert_eq!(body["error"]["request_id"], ctx.request_id().to_string());
    assert_eq!(journal.entries(), ["handler"], "handler runs exactly once");
    assert_eq!(ctx.state(), ExecutionState::Faulted);
}

#[tokio::test]
async fn test_terminate_runs_route_hooks_before_global_hooks() {
    let journal = Journal::default();
    let mut registry = MiddlewareRegistry::new();
    registry
        .register("global", Recorder { label: "G", journal: journal.clone() })
        .register("grouped", Recorder { label: "W", journal: journal.clone() })
        .register("route", Recorder { label: "R", journal: journal.clone() })
        .global("global", 0)
        .group("web", ["grouped"]);

    let pipeline = registry
        .build(&ids(&["route", "web"]), recording_handler(&journal))
        .unwrap();
    assert_eq!(pipeline.middleware_ids(), ["global", "grouped", "route"]);

    let mut ctx = context(get("/admin"));
    Executor::default().execute(&pipeline, &mut ctx).await.unwrap();

    let terminates: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|e| e.ends_with(":terminate"))
        .collect();
    assert_eq!(terminates, ["W:terminate", "R:terminate", "G:terminate"]);
}

#[tokio::test]
async fn test_per_request_factories_build_fresh_instances() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Middleware for Counted {
        fn name(&self) -> &'static str {
            "counted"
        }

        fn handle<'a>(&'a self, ctx: &'a mut PipelineContext, next: Next<'a>) -> BoxFuture<'a, ChainResult> {
            Box::pin(async move { next.run(ctx).await })
        }
    }

    let mut registry = MiddlewareRegistry::new();
    registry.register_factory("counted", || {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Counted
    });
    let journal = Journal::default();
    let pipeline = registry.build(&ids(&["counted"]), recording_handler(&journal)).unwrap();
    let executor = Executor::default();

    for _ in 0..2 {
        let mut ctx = context(get("/admin"));
        executor.execute(&pipeline, &mut ctx).await.unwrap();
    }
    assert_eq!(BUILT.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_handler_faults_are_rendered() {
    let mut registry = MiddlewareRegistry::new();
    registry.register("request_id", portico_middleware::stages::RequestIdMiddleware::new());
    let handler: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx| async {
        Err(MiddlewareFault::not_found("No such article.").into())
    }));
    let pipeline = registry.build(&ids(&["request_id"]), handler).unwrap();

    let mut ctx = context(get_json("/resources/articles/9"));
    let response = Executor::default().execute(&pipeline, &mut ctx).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.header("x-request-id"),
        Some(ctx.request_id().to_string().as_str()),
        "pending headers reach error responses"
    );
    let body: serde_json::Value = serde_json::from_str(&body_text(&response)).unwrap();
    assert_eq!(body["error"]["message"], "No such article.");
}

#[tokio::test]
async fn test_disconnect_before_start_aborts() {
    let journal = Journal::default();
    let registry = MiddlewareRegistry::new();
    let pipeline = registry.build(&[], recording_handler(&journal)).unwrap();

    let signal = DisconnectSignal::new();
    signal.trigger();
    let mut ctx = context(get("/admin")).with_disconnect(signal);

    assert!(Executor::default().execute(&pipeline, &mut ctx).await.is_none());
    assert_eq!(ctx.state(), ExecutionState::Aborted);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_disconnect_mid_flight_abandons_the_chain() {
    let journal = Journal::default();
    let mut registry = MiddlewareRegistry::new();
    registry.register("a", Recorder { label: "A", journal: journal.clone() });
    let handler: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx| async {
        std::future::pending::<()>().await;
        Ok(OutboundMessage::ok())
    }));
    let pipeline = registry.build(&ids(&["a"]), handler).unwrap();

    let signal = DisconnectSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();
    });

    let mut ctx = context(get("/reports/export")).with_disconnect(signal);
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        Executor::default().execute(&pipeline, &mut ctx),
    )
    .await
    .unwrap();

    assert!(outcome.is_none());
    assert_eq!(ctx.state(), ExecutionState::Aborted);
    assert_eq!(journal.entries(), ["A:before"], "no post-processing, no terminate");
}

#[tokio::test]
async fn test_auth_and_verified_protect_a_route() {
    let sessions = Arc::new(InMemorySessionStore::new());
    sessions
        .insert("verified", AuthUser::new("1", "Ada").with_email("ada@example.test", true))
        .await;
    sessions
        .insert("pending", AuthUser::new("2", "Bob").with_email("bob@example.test", false))
        .await;

    let mut registry = MiddlewareRegistry::new();
    let mut container = Container::new();
    Builtins::new(sessions)
        .login_path("/admin/login")
        .install(&mut registry, &mut container);
    let container = Arc::new(container);

    let handler: Arc<dyn Handler> = Arc::new(handler_fn(|ctx| {
        let name = ctx.user().map(|u| u.name.clone()).unwrap_or_default();
        async move { Ok(OutboundMessage::text(StatusCode::OK, name)) }
    }));
    let pipeline = registry.build(&ids(&["auth", "verified"]), handler).unwrap();
    let executor = Executor::default();

    let request = |session: Option<&str>| {
        let mut builder = InboundMessage::builder(Method::Get, "/admin/settings")
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(session) = session {
            let mut cookies = portico_core::CookieJar::new();
            cookies.insert("portico_session", session);
            builder = builder.cookies(cookies);
        }
        PipelineContext::new(builder.build(), container.begin_scope())
    };

    let mut ctx = request(None);
    let response = executor.execute(&pipeline, &mut ctx).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut ctx = request(Some("pending"));
    let response = executor.execute(&pipeline, &mut ctx).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut ctx = request(Some("verified"));
    let response = executor.execute(&pipeline, &mut ctx).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "Ada");
}

#[tokio::test]
async fn test_throttle_limits_per_client() {
    let mut registry = MiddlewareRegistry::new();
    let mut container = Container::new();
    Builtins::new(Arc::new(InMemorySessionStore::new())).install(&mut registry, &mut container);
    let container = Arc::new(container);

    let handler: Arc<dyn Handler> =
        Arc::new(handler_fn(|_ctx| async { Ok(OutboundMessage::text(StatusCode::OK, "ok")) }));
    let pipeline = registry.build(&ids(&["throttle:2,1"]), handler).unwrap();
    let executor = Executor::default();

    let mut statuses = Vec::new();
    let mut last = None;
    for _ in 0..3 {
        let message = InboundMessage::builder(Method::Post, "/admin/login")
            .client_addr("203.0.113.7:51000".parse().unwrap())
            .build();
        let mut ctx = PipelineContext::new(message, container.begin_scope());
        let response = executor.execute(&pipeline, &mut ctx).await.unwrap();
        statuses.push(response.status());
        last = Some(response);
    }

    assert_eq!(
        statuses,
        [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
    let last = last.unwrap();
    assert_eq!(last.header("x-ratelimit-limit"), Some("2"));
    assert_eq!(last.header("x-ratelimit-remaining"), Some("0"));
    assert!(last.header("retry-after").is_some());
}
