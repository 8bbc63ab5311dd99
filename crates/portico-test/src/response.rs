//! Test response wrapper.

use std::fmt;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use portico_translate::ResponseBody;
use serde::de::DeserializeOwned;

use crate::error::TestError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// A fully read kernel response.
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Reads a runtime response.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the body stream fails.
    pub async fn from_http(response: http::Response<ResponseBody>) -> Result<Self, TestError> {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();
        Ok(Self::new(parts.status, parts.headers, body))
    }

    /// Assembles a response from parts.
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Status as a number.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// First value of a header as text.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// `Location`, for redirects.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.header_str(header::LOCATION.as_str())
    }

    /// The request id echoed back by the `request_id` middleware.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.header_str(REQUEST_ID_HEADER)
    }

    /// The `Set-Cookie` line for `name`, if one was sent.
    #[must_use]
    pub fn set_cookie(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}=");
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|line| line.starts_with(&prefix))
    }

    /// Raw body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the body is not UTF-8.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Body decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Json` if decoding fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Json` if the body is not JSON.
    pub fn json_value(&self) -> Result<serde_json::Value, TestError> {
        self.json()
    }

    /// `error.code` from a JSON error envelope.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        let value = self.json_value().ok()?;
        json_path(&value, "error.code")?.as_str().map(String::from)
    }

    /// Panics unless the status matches.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {expected}, got {} with body {:?}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Panics unless this is a redirect to `location`.
    pub fn assert_redirect(&self, location: &str) -> &Self {
        assert!(
            self.status.is_redirection(),
            "expected a redirect, got {}",
            self.status
        );
        assert_eq!(self.location(), Some(location), "redirect target mismatch");
        self
    }

    /// Panics unless the header has the given value.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected, "header '{name}' mismatch");
        self
    }

    /// Panics unless the content type starts with `expected`.
    pub fn assert_content_type(&self, expected: impl AsRef<str>) -> &Self {
        let expected = expected.as_ref();
        let actual = self.content_type().unwrap_or_default();
        assert!(
            actual.starts_with(expected),
            "content type: expected '{expected}', got '{actual}'"
        );
        self
    }

    /// Panics unless the body contains `expected`.
    pub fn assert_body_contains(&self, expected: impl AsRef<str>) -> &Self {
        let expected = expected.as_ref();
        let body = String::from_utf8_lossy(&self.body);
        assert!(
            body.contains(expected),
            "body should contain '{expected}', got: {body}"
        );
        self
    }

    /// Panics unless the JSON error envelope carries `code`.
    pub fn assert_error_code(&self, code: &str) -> &Self {
        assert_eq!(
            self.error_code().as_deref(),
            Some(code),
            "error code mismatch in {:?}",
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Panics unless the JSON value at a dotted path equals `expected`.
    pub fn assert_json_field(&self, path: &str, expected: &serde_json::Value) -> &Self {
        let json = self
            .json_value()
            .unwrap_or_else(|e| panic!("body is not JSON: {e}"));
        let actual = json_path(&json, path)
            .unwrap_or_else(|| panic!("JSON path '{path}' not found in {json}"));
        assert_eq!(actual, expected, "JSON field '{path}' mismatch");
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn json_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_response(status: StatusCode, body: &serde_json::Value) -> TestResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        TestResponse::new(status, headers, Bytes::from(body.to_string()))
    }

    #[test]
    fn test_error_code() {
        let response = json_response(
            StatusCode::UNAUTHORIZED,
            &json!({"error": {"code": "UNAUTHENTICATED", "message": "login required"}}),
        );
        response
            .assert_status(StatusCode::UNAUTHORIZED)
            .assert_content_type("application/json")
            .assert_error_code("UNAUTHENTICATED");
    }

    #[test]
    fn test_json_path_with_index() {
        let response = json_response(
            StatusCode::OK,
            &json!({"routes": [{"name": "admin.dashboard"}]}),
        );
        response.assert_json_field("routes.0.name", &json!("admin.dashboard"));
    }

    #[test]
    fn test_set_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("theme=dark; Path=/"));
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("portico_session=abc; HttpOnly"),
        );
        let response = TestResponse::new(StatusCode::OK, headers, Bytes::new());
        assert_eq!(
            response.set_cookie("portico_session"),
            Some("portico_session=abc; HttpOnly")
        );
        assert_eq!(response.set_cookie("missing"), None);
    }

    #[test]
    fn test_redirect() {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static("/login"));
        TestResponse::new(StatusCode::FOUND, headers, Bytes::new()).assert_redirect("/login");
    }
}
