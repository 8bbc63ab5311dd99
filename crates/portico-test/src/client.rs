//! In-memory client driving a [`Kernel`].

use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use portico_middleware::DisconnectSignal;
use portico_server::Kernel;
use serde::Serialize;

use crate::error::TestError;
use crate::multipart::MultipartForm;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;

/// Sends requests straight into a kernel without binding a port.
///
/// Requests pass through inbound translation, routing, the full middleware
/// pipeline and outbound translation, exactly as they do behind the
/// server.
///
/// ```rust,no_run
/// use portico_server::Kernel;
/// use portico_test::TestClient;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TestClient::new(Kernel::builder().build()?);
/// let response = client.get("/missing").expects_json().send().await;
/// response.assert_error_code("NOT_FOUND");
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    kernel: Arc<Kernel>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps a kernel.
    pub fn new(kernel: Kernel) -> Self {
        Self::from_arc(Arc::new(kernel))
    }

    /// Wraps a shared kernel, for tests that also reload it.
    pub const fn from_arc(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            default_headers: Vec::new(),
        }
    }

    /// The kernel under test.
    #[must_use]
    pub const fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Adds a header to every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::HEAD, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let builder = self
            .default_headers
            .iter()
            .fold(TestRequestBuilder::new(method, uri), |builder, (name, value)| {
                builder.header(name, value)
            });
        TestClientRequest {
            client: self,
            builder,
            disconnect: DisconnectSignal::new(),
        }
    }

    async fn dispatch(
        &self,
        request: TestRequest,
        disconnect: DisconnectSignal,
    ) -> Result<TestResponse, TestError> {
        let raw = request.into_raw()?;
        let response = self
            .kernel
            .handle(raw, disconnect)
            .await
            .ok_or(TestError::Aborted)?;
        TestResponse::from_http(response).await
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
    disconnect: DisconnectSignal,
}

impl TestClientRequest<'_> {
    /// Appends a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets `Content-Type`.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Asks for JSON responses.
    pub fn expects_json(mut self) -> Self {
        self.builder = self.builder.expects_json();
        self
    }

    /// Asks for HTML responses.
    pub fn expects_html(mut self) -> Self {
        self.builder = self.builder.accept("text/html,application/xhtml+xml");
        self
    }

    /// Adds a cookie.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.cookie(name, value);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a form-urlencoded body.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Sets a multipart body.
    pub fn multipart(mut self, form: &MultipartForm) -> Self {
        self.builder = self.builder.multipart(form);
        self
    }

    /// Uses `signal` as the client-disconnect notification, so a test can
    /// hang up mid-request.
    pub fn disconnect(mut self, signal: DisconnectSignal) -> Self {
        self.disconnect = signal;
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request is invalid or aborted; use
    /// [`try_send`](Self::try_send) to inspect those cases.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns `TestError` if the request is invalid, the kernel aborted it
    /// or the body could not be read.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.dispatch(request, self.disconnect).await
    }
}
