//! Test request building.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use portico_translate::{ConnectionInfo, RawRequest};
use serde::Serialize;

use crate::error::TestError;
use crate::multipart::MultipartForm;

/// A request ready to be handed to the kernel.
#[derive(Debug)]
pub struct TestRequest {
    /// HTTP method.
    pub method: Method,
    /// Request target.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
    /// Connection the request pretends to arrive on.
    pub conn: ConnectionInfo,
}

impl TestRequest {
    /// Starts a GET request.
    pub fn get(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::DELETE, uri)
    }

    /// Starts a HEAD request.
    pub fn head(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::HEAD, uri)
    }

    /// Converts into the runtime request the kernel consumes.
    ///
    /// # Errors
    ///
    /// Returns `TestError::RequestBuild` if the parts do not form a valid
    /// request.
    pub fn into_raw(self) -> Result<RawRequest, TestError> {
        let mut builder = http::Request::builder().method(self.method).uri(self.uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        let request = builder
            .body(self.body)
            .map_err(|e| TestError::RequestBuild(e.to_string()))?;
        Ok(RawRequest::new(request, self.conn))
    }
}

/// Builder for [`TestRequest`].
///
/// Invalid header names or values are reported by [`build`](Self::build).
#[must_use]
#[derive(Debug)]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    conn: ConnectionInfo,
    error: Option<String>,
}

impl TestRequestBuilder {
    /// Starts a request.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: None,
            conn: ConnectionInfo::default(),
            error: None,
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = HeaderName::try_from(name.as_ref());
        let value = HeaderValue::try_from(value.as_ref());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => self.fail(format!("invalid header name: {e}")),
            (_, Err(e)) => self.fail(format!("invalid header value: {e}")),
        }
        self
    }

    /// Sets the `Content-Type` header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.headers.remove(header::CONTENT_TYPE);
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets the `Accept` header.
    pub fn accept(mut self, accept: impl AsRef<str>) -> Self {
        self.headers.remove(header::ACCEPT);
        self.header(header::ACCEPT.as_str(), accept)
    }

    /// Asks for JSON responses, as an XHR client would.
    pub fn expects_json(self) -> Self {
        self.accept("application/json")
    }

    /// Adds a cookie to the `Cookie` header.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{name}={value}");
        let combined = match self
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{existing}; {pair}"),
            None => pair,
        };
        self.headers.remove(header::COOKIE);
        self.header(header::COOKIE.as_str(), combined)
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and its content type.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.fail(format!("JSON encoding failed: {e}")),
        }
        self.content_type("application/json")
    }

    /// Sets a form-urlencoded body and its content type.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Some(Bytes::from(encoded)),
            Err(e) => self.fail(format!("form encoding failed: {e}")),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// Sets a `multipart/form-data` body and its content type.
    pub fn multipart(mut self, form: &MultipartForm) -> Self {
        let (content_type, body) = form.encode();
        self.body = Some(body);
        self.content_type(content_type)
    }

    /// Pretends the request comes from `ip`.
    pub fn remote_ip(mut self, ip: IpAddr) -> Self {
        self.conn.remote_addr = SocketAddr::new(ip, self.conn.remote_addr.port());
        self
    }

    /// Marks the connection as TLS.
    pub fn secure(mut self) -> Self {
        self.conn = self.conn.secure(true);
        self
    }

    fn fail(&mut self, message: String) {
        self.error.get_or_insert(message);
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns `TestError::RequestBuild` for an invalid URI or the first
    /// invalid header.
    pub fn build(self) -> Result<TestRequest, TestError> {
        if let Some(message) = self.error {
            return Err(TestError::RequestBuild(message));
        }
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("invalid URI: {e}")))?;

        Ok(TestRequest {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
            conn: self.conn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_get() {
        let request = TestRequest::get("/admin/articles?page=2").build().unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.uri.path(), "/admin/articles");
        assert_eq!(request.uri.query(), Some("page=2"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_json_sets_content_type() {
        let request = TestRequest::post("/api/articles")
            .json(&json!({"title": "Hello"}))
            .build()
            .unwrap();
        assert_eq!(request.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(&request.body[..], br#"{"title":"Hello"}"#);
    }

    #[test]
    fn test_form_encoding() {
        let request = TestRequest::post("/login")
            .form(&[("email", "a@b.test"), ("remember", "on")])
            .build()
            .unwrap();
        assert_eq!(
            request.headers[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(&request.body[..], b"email=a%40b.test&remember=on");
    }

    #[test]
    fn test_cookies_accumulate() {
        let request = TestRequest::get("/")
            .cookie("portico_session", "abc")
            .cookie("theme", "dark")
            .build()
            .unwrap();
        assert_eq!(request.headers[header::COOKIE], "portico_session=abc; theme=dark");
    }

    #[test]
    fn test_invalid_header_reported_on_build() {
        let result = TestRequest::get("/").header("bad header", "x").build();
        assert!(matches!(result, Err(TestError::RequestBuild(_))));
    }

    #[test]
    fn test_into_raw_keeps_connection() {
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let raw = TestRequest::get("/")
            .remote_ip(ip)
            .secure()
            .build()
            .unwrap()
            .into_raw()
            .unwrap();
        assert_eq!(raw.conn.remote_addr.ip(), ip);
        assert!(raw.conn.secure);
    }
}
