//! The framework-side response value.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use std::fmt;

/// A lazily produced response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Response body.
pub enum Body {
    /// No body.
    Empty,
    /// A complete in-memory body.
    Bytes(Bytes),
    /// A streamed body, written chunk by chunk.
    Stream(BodyStream),
}

impl Body {
    /// Returns the buffered bytes, if the body is not streamed.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// `true` for [`Body::Stream`].
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// `true` for [`Body::Empty`] or a zero-length buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(b) => b.is_empty(),
            Self::Stream(_) => false,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Bytes(b) => f.debug_tuple("Body::Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

/// Builds a header value from arbitrary text.
///
/// Bytes outside visible ASCII are percent-encoded so the result is always a
/// valid header value.
#[must_use]
pub fn header_value_lossy(value: &str) -> HeaderValue {
    let visible = |b: u8| (0x20..0x7f).contains(&b);
    if value.bytes().all(visible) {
        if let Ok(v) = HeaderValue::from_str(value) {
            return v;
        }
    }
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if visible(byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    HeaderValue::from_str(&encoded).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// A response under construction by middleware and handlers.
#[derive(Debug)]
pub struct OutboundMessage {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    content_length: Option<u64>,
}

impl OutboundMessage {
    /// An empty response with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
            content_length: None,
        }
    }

    /// `200 OK` with no body.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// `204 No Content`.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// Serializes `value` as a JSON response.
    pub fn json<T: Serialize + ?Sized>(
        status: StatusCode,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(body))
    }

    /// A JSON response from an already built value.
    #[must_use]
    pub fn json_value(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(value.to_string())
    }

    /// A `text/html` response.
    #[must_use]
    pub fn html(status: StatusCode, html: impl Into<Body>) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )
            .with_body(html)
    }

    /// A `text/plain` response.
    #[must_use]
    pub fn text(status: StatusCode, text: impl Into<Body>) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body(text)
    }

    /// A `302 Found` redirect.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with_status(location, StatusCode::FOUND)
    }

    /// A redirect with an explicit 3xx status.
    ///
    /// Carries a small HTML body for clients that do not follow `Location`.
    #[must_use]
    pub fn redirect_with_status(location: &str, status: StatusCode) -> Self {
        let escaped = escape_html(location);
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\" />\n\
             <meta http-equiv=\"refresh\" content=\"0;url='{escaped}'\" />\n\
             <title>Redirecting to {escaped}</title>\n</head>\n\
             <body>Redirecting to <a href=\"{escaped}\">{escaped}</a>.</body>\n</html>"
        );
        Self::html(status, page).with_header(header::LOCATION, header_value_lossy(location))
    }

    /// A streamed response; written with chunked transfer encoding.
    #[must_use]
    pub fn stream(status: StatusCode, stream: BodyStream) -> Self {
        Self::new(status).with_body(Body::Stream(stream))
    }

    /// A file download with `Content-Disposition: attachment`.
    ///
    /// Non-ASCII file names get an ASCII fallback plus an RFC 5987
    /// `filename*` parameter.
    #[must_use]
    pub fn download(filename: &str, content: impl Into<Body>, mime: Option<&str>) -> Self {
        let content_type = mime
            .and_then(|m| HeaderValue::from_str(m).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_header(header::CONTENT_DISPOSITION, content_disposition(filename))
            .with_body(content)
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Replaces the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of the named header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Explicit content length, if one was declared.
    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Declares an explicit content length.
    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    /// Builder form of [`Self::set_status`].
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Inserts a header, replacing existing values.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header value, keeping existing values.
    pub fn with_appended_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Builder form of [`Self::set_body`].
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder form of [`Self::set_content_length`].
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Splits into status, headers, body and explicit length.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body, Option<u64>) {
        (self.status, self.headers, self.body, self.content_length)
    }
}

impl Default for OutboundMessage {
    fn default() -> Self {
        Self::ok()
    }
}

fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = if filename.is_ascii() && fallback == filename {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    };
    header_value_lossy(&value)
}

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_sets_content_type() {
        let msg =
            OutboundMessage::json(StatusCode::CREATED, &serde_json::json!({"id": 7})).unwrap();
        assert_eq!(msg.status(), StatusCode::CREATED);
        assert_eq!(msg.header("content-type"), Some("application/json"));
        assert_eq!(msg.body().as_bytes().unwrap().as_ref(), br#"{"id":7}"#);
    }

    #[test]
    fn test_redirect_shape() {
        let msg = OutboundMessage::redirect("/admin/login?next=<x>");
        assert_eq!(msg.status(), StatusCode::FOUND);
        assert_eq!(msg.header("location"), Some("/admin/login?next=<x>"));
        let body = String::from_utf8(msg.body().as_bytes().unwrap().to_vec()).unwrap();
        assert!(body.contains("&lt;x&gt;"));
        assert!(msg.header("content-type").unwrap().starts_with("text/html"));
    }

    #[test]
    fn test_download_ascii_name() {
        let msg = OutboundMessage::download("report.csv", "a,b\n", Some("text/csv"));
        assert_eq!(
            msg.header("content-disposition"),
            Some("attachment; filename=\"report.csv\"")
        );
        assert_eq!(msg.header("content-type"), Some("text/csv"));
    }

    #[test]
    fn test_download_non_ascii_name() {
        let msg = OutboundMessage::download("résumé.pdf", Bytes::from_static(b"%PDF"), None);
        let disposition = msg.header("content-disposition").unwrap();
        assert!(disposition.starts_with("attachment; filename=\"r_sum_.pdf\""));
        assert!(disposition.contains("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
        assert_eq!(msg.header("content-type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_header_value_lossy_encodes() {
        let v = header_value_lossy("/café");
        assert_eq!(v.to_str().unwrap(), "/caf%C3%A9");
    }

    #[test]
    fn test_body_helpers() {
        assert!(Body::Empty.is_empty());
        assert!(Body::from("").is_empty());
        let stream: BodyStream = Box::pin(futures_util::stream::empty());
        assert!(Body::Stream(stream).is_stream());
    }
}
