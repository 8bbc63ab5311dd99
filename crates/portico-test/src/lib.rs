//! # Portico Test
//!
//! In-memory testing for Portico applications. A [`TestClient`] feeds
//! requests directly to a [`Kernel`](portico_server::Kernel), so tests
//! exercise translation, routing and the whole middleware pipeline without
//! a socket.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use portico_core::{ChainResult, Method, OutboundMessage};
//! use portico_middleware::handler_fn;
//! use portico_router::RouteTable;
//! use portico_server::{HandlerRef, Kernel};
//! use portico_test::TestClient;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let hello: HandlerRef = Arc::new(handler_fn(|_| async {
//!     ChainResult::Ok(OutboundMessage::text(StatusCode::OK, "hello"))
//! }));
//! let mut routes = RouteTable::new();
//! routes.register(Method::Get, "/hello", "hello", Vec::<String>::new(), hello)?;
//!
//! let client = TestClient::new(Kernel::builder().routes(routes).build()?);
//! client
//!     .get("/hello")
//!     .send()
//!     .await
//!     .assert_status(StatusCode::OK)
//!     .assert_body_contains("hello");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/portico-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod multipart;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use multipart::MultipartForm;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
