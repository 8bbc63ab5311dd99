//! Accept loop tests over a real loopback socket.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use portico_core::{ChainResult, Method, OutboundMessage};
use portico_middleware::{handler_fn, PipelineContext};
use portico_router::RouteTable;
use portico_server::{HandlerRef, Kernel, Server, ServerConfig, ShutdownSignal};
use portico_translate::TranslatorConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn text(body: &'static str) -> HandlerRef {
    Arc::new(handler_fn(move |_: &mut PipelineContext| async move {
        ChainResult::Ok(OutboundMessage::text(StatusCode::OK, body))
    }))
}

fn slow() -> HandlerRef {
    Arc::new(handler_fn(|_: &mut PipelineContext| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        ChainResult::Ok(OutboundMessage::text(StatusCode::OK, "late"))
    }))
}

struct Running {
    addr: std::net::SocketAddr,
    shutdown: ShutdownSignal,
    task: JoinHandle<Result<(), portico_server::ServerError>>,
}

async fn start(kernel: Kernel, config: ServerConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(config, Arc::new(kernel));
    let task = tokio::spawn(server.serve(listener, shutdown.clone()));
    Running {
        addr,
        shutdown,
        task,
    }
}

async fn exchange(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn routes() -> RouteTable<HandlerRef> {
    let mut routes = RouteTable::new();
    routes
        .register(Method::Get, "/ping", "ping", Vec::<String>::new(), text("pong"))
        .unwrap();
    routes
        .register(Method::Get, "/slow", "slow", Vec::<String>::new(), slow())
        .unwrap();
    routes
        .register(Method::Post, "/upload", "upload", Vec::<String>::new(), text("stored"))
        .unwrap();
    routes
}

fn config() -> ServerConfig {
    ServerConfig::builder()
        .request_timeout(Some(Duration::from_millis(100)))
        .shutdown_timeout(Duration::from_secs(1))
        .build()
}

#[tokio::test]
async fn test_serves_requests_and_shuts_down() {
    let kernel = Kernel::builder().routes(routes()).build().unwrap();
    let running = start(kernel, config()).await;

    let response = exchange(
        running.addr,
        b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("pong"), "{response}");

    running.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_slow_requests_time_out() {
    let kernel = Kernel::builder().routes(routes()).build().unwrap();
    let running = start(kernel, config()).await;

    let response = exchange(
        running.addr,
        b"GET /slow HTTP/1.1\r\nHost: localhost\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 504"), "{response}");
    assert!(response.contains("\"TIMEOUT\""), "{response}");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_bodies_are_cut_off() {
    let kernel = Kernel::builder()
        .translator(TranslatorConfig::new().max_body_size(16))
        .routes(routes())
        .build()
        .unwrap();
    let running = start(kernel, config()).await;

    let body = "x".repeat(64);
    let request = format!(
        "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/plain\r\n\
         Accept: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let response = exchange(running.addr, request.as_bytes()).await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");
    assert!(response.contains("PAYLOAD_TOO_LARGE"), "{response}");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_paths_return_404() {
    let kernel = Kernel::builder().routes(routes()).build().unwrap();
    let running = start(kernel, config()).await;

    let response = exchange(
        running.addr,
        b"GET /missing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    running.shutdown.trigger();
}
