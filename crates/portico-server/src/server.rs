//! The accept loop.
//!
//! Each connection is served by hyper's HTTP/1.1 machinery on its own task.
//! Each request body is collected up to the translator's size limit and
//! handed to the [`Kernel`] with a fresh [`DisconnectSignal`]. When hyper
//! drops a request future because the peer went away, the signal fires and
//! the pipeline abandons its remaining work.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use portico_server::{Kernel, Server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let kernel = Arc::new(Kernel::builder().build()?);
//! let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();
//! Server::new(config, kernel).run().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portico_core::{TranslationError, TranslationErrorKind};
use portico_middleware::{DisconnectGuard, DisconnectSignal};
use portico_translate::{empty_body, ConnectionInfo, RawRequest, ResponseBody};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::kernel::Kernel;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Serves a [`Kernel`] over HTTP/1.1.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    kernel: Arc<Kernel>,
}

impl Server {
    /// Creates a server for `kernel`.
    #[must_use]
    pub const fn new(config: ServerConfig, kernel: Arc<Kernel>) -> Self {
        Self { config, kernel }
    }

    /// Accept loop settings.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The kernel requests are dispatched to.
    #[must_use]
    pub const fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the listener cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and runs until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address is invalid or taken.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| ServerError::Bind {
            addr: self.config.http_addr().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        self.serve(listener, shutdown).await
    }

    /// Runs on an already bound listener until `shutdown` fires, then waits
    /// up to the shutdown timeout for open connections to finish.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Io` if the listener's address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        info!(addr = %local, routes = self.kernel.routing().routes().len(), "portico listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.serve_connection(stream, remote, local, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            connections = tracker.active_connections(),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }
        info!("portico stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        local: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.respond(req, remote, local).await) }
        });

        let conn = http1::Builder::new()
            .keep_alive(self.config.keep_alive())
            .serve_connection(io, service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(e) = result {
            debug!(peer = %remote, error = %e, "connection closed with error");
        }
    }

    async fn respond(
        &self,
        req: Request<Incoming>,
        remote: SocketAddr,
        local: SocketAddr,
    ) -> Response<ResponseBody> {
        let conn = ConnectionInfo::new(remote, local);
        let (parts, body) = req.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let headers = parts.headers.clone();

        let disconnect = DisconnectSignal::new();
        let guard = DisconnectGuard::new(disconnect.clone());
        let limit = self.kernel.translator().config().max_body_size;

        let work = async {
            let body = match collect_body(body, limit).await {
                Ok(body) => body,
                Err(early) => return Some(early.into_response(&self.kernel, &method, &headers)),
            };
            let raw = RawRequest::new(Request::from_parts(parts, body), conn);
            self.kernel.handle(raw, disconnect).await
        };

        let outcome = match self.config.request_timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        http.method = %method,
                        http.path = %path,
                        "request timed out"
                    );
                    Some(self.kernel.timeout_response(&method, &headers))
                }
            },
            None => work.await,
        };
        guard.disarm();

        outcome.unwrap_or_else(|| status_only(StatusCode::SERVICE_UNAVAILABLE))
    }
}

enum EarlyExit {
    TooLarge(usize),
    Unreadable,
}

impl EarlyExit {
    fn into_response(
        self,
        kernel: &Kernel,
        method: &http::Method,
        headers: &http::HeaderMap,
    ) -> Response<ResponseBody> {
        match self {
            Self::TooLarge(limit) => kernel.reject(
                &TranslationError::new(
                    TranslationErrorKind::PayloadTooLarge,
                    format!("body exceeds the limit of {limit} bytes"),
                ),
                method,
                headers,
            ),
            Self::Unreadable => status_only(StatusCode::BAD_REQUEST),
        }
    }
}

async fn collect_body(body: Incoming, limit: usize) -> Result<Bytes, EarlyExit> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(EarlyExit::TooLarge(limit)),
        Err(e) => {
            debug!(error = %e, "request body could not be read");
            Err(EarlyExit::Unreadable)
        }
    }
}

fn status_only(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_invalid_address() {
        let kernel = Arc::new(Kernel::builder().build().unwrap());
        let config = ServerConfig::builder().http_addr("not-an-address").build();
        let result = Server::new(config, kernel)
            .run_with_shutdown(ShutdownSignal::new())
            .await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let kernel = Arc::new(Kernel::builder().build().unwrap());
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:0")
            .shutdown_timeout(Duration::from_millis(100))
            .build();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Server::new(config, kernel).run_with_shutdown(shutdown),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[test]
    fn test_status_only() {
        let response = status_only(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
