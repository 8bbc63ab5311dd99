//! Error taxonomy shared across the bridge.
//!
//! Each failure class has its own type so callers can tell apart a malformed
//! request ([`TranslationError`]), a middleware rejecting a request
//! ([`MiddlewareFault`]) and a pipeline defect ([`PipelineError`]). Inside
//! a running chain they travel together as [`Fault`].
//!
//! | Type | Status |
//! |---|---|
//! | `TranslationError` | 400 / 405 / 413 / 415 / 431 (500 for server-side failures) |
//! | `MiddlewareFault` | per [`FaultCategory`] |
//! | `PipelineError` | 500 |

use http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::outbound::OutboundMessage;

/// Result of running (part of) a middleware chain.
pub type ChainResult = Result<OutboundMessage, Fault>;

/// What went wrong while translating a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationErrorKind {
    /// A header name or value is not valid visible ASCII.
    MalformedHeader,
    /// More headers than the configured maximum.
    TooManyHeaders,
    /// The query string could not be decoded.
    MalformedQuery,
    /// The body does not match its declared content type.
    MalformedBody,
    /// A `GET` or `HEAD` request carried a body.
    UnexpectedBody,
    /// The body exceeds a configured size limit.
    PayloadTooLarge,
    /// The body's content type is not accepted.
    UnsupportedMediaType,
    /// The method is outside the routed set.
    UnsupportedMethod,
    /// An explicit response length disagrees with the body.
    ContentLengthMismatch,
    /// An upload could not be spooled to disk.
    UploadFailed,
}

impl TranslationErrorKind {
    /// HTTP status for this kind.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::MalformedHeader
            | Self::MalformedQuery
            | Self::MalformedBody
            | Self::UnexpectedBody => StatusCode::BAD_REQUEST,
            Self::TooManyHeaders => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnsupportedMethod => StatusCode::METHOD_NOT_ALLOWED,
            Self::ContentLengthMismatch | Self::UploadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedHeader => "MALFORMED_HEADER",
            Self::TooManyHeaders => "TOO_MANY_HEADERS",
            Self::MalformedQuery => "MALFORMED_QUERY",
            Self::MalformedBody => "MALFORMED_BODY",
            Self::UnexpectedBody => "UNEXPECTED_BODY",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::UnsupportedMethod => "UNSUPPORTED_METHOD",
            Self::ContentLengthMismatch => "CONTENT_LENGTH_MISMATCH",
            Self::UploadFailed => "UPLOAD_FAILED",
        }
    }
}

impl fmt::Display for TranslationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MalformedHeader => "malformed header",
            Self::TooManyHeaders => "too many headers",
            Self::MalformedQuery => "malformed query string",
            Self::MalformedBody => "malformed body",
            Self::UnexpectedBody => "unexpected request body",
            Self::PayloadTooLarge => "payload too large",
            Self::UnsupportedMediaType => "unsupported media type",
            Self::UnsupportedMethod => "unsupported method",
            Self::ContentLengthMismatch => "content length mismatch",
            Self::UploadFailed => "upload failed",
        };
        f.write_str(text)
    }
}

/// A message could not be translated between runtime and framework.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct TranslationError {
    /// Failure class.
    pub kind: TranslationErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

impl TranslationError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: TranslationErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

/// Category of a [`MiddlewareFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    /// No valid session.
    Unauthenticated,
    /// Authenticated but not allowed.
    Forbidden,
    /// Resource does not exist.
    NotFound,
    /// Input failed validation.
    BadInput,
    /// Rate limit exceeded.
    TooManyRequests,
    /// Anything else.
    Internal,
}

impl FaultCategory {
    /// HTTP status for this category.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadInput => StatusCode::BAD_REQUEST,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::BadInput => "BAD_INPUT",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A middleware or handler rejected the request.
#[derive(Debug, Error)]
#[error("{category}: {message}")]
pub struct MiddlewareFault {
    category: FaultCategory,
    message: String,
    redirect_to: Option<String>,
    headers: HeaderMap,
    #[source]
    source: Option<anyhow::Error>,
}

impl MiddlewareFault {
    /// Creates a fault of the given category.
    #[must_use]
    pub fn new(category: FaultCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            redirect_to: None,
            headers: HeaderMap::new(),
            source: None,
        }
    }

    /// 401.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(FaultCategory::Unauthenticated, message)
    }

    /// 403.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(FaultCategory::Forbidden, message)
    }

    /// 404.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultCategory::NotFound, message)
    }

    /// 400.
    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(FaultCategory::BadInput, message)
    }

    /// 429 with a `Retry-After` header.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::new(FaultCategory::TooManyRequests, message)
            .with_header(RETRY_AFTER, HeaderValue::from(retry_after_secs))
    }

    /// 500.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultCategory::Internal, message)
    }

    /// 500 carrying the underlying error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let mut fault = Self::internal(message);
        fault.source = Some(source.into());
        fault
    }

    /// Sets where HTML clients should be redirected.
    #[must_use]
    pub fn with_redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect_to = Some(location.into());
        self
    }

    /// Adds a header to the rendered error response.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The fault category.
    #[must_use]
    pub const fn category(&self) -> FaultCategory {
        self.category
    }

    /// The client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Redirect target for HTML clients.
    #[must_use]
    pub fn redirect_to(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }

    /// Extra headers for the rendered response.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// HTTP status for this fault.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category.status_code()
    }
}

impl From<anyhow::Error> for MiddlewareFault {
    fn from(err: anyhow::Error) -> Self {
        Self {
            category: FaultCategory::Internal,
            message: err.to_string(),
            redirect_to: None,
            headers: HeaderMap::new(),
            source: Some(err),
        }
    }
}

/// Defects in pipeline construction or execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// `next` was invoked for a position that already ran.
    #[error("index out of bounds: next called again at position {index} of a chain of length {len}")]
    IndexOutOfBounds {
        /// Position requested.
        index: usize,
        /// Chain length, handler included.
        len: usize,
    },

    /// A route or group names middleware that is not registered.
    #[error("unknown middleware: {0}")]
    UnknownMiddleware(String),

    /// Middleware groups reference each other in a loop.
    #[error("middleware group cycle detected at '{0}'")]
    GroupCycle(String),

    /// Parameters after `:` could not be parsed.
    #[error("invalid arguments for middleware '{id}': {reason}")]
    InvalidArguments {
        /// Middleware identifier.
        id: String,
        /// What was wrong.
        reason: String,
    },
}

impl PipelineError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IndexOutOfBounds { .. } => "PIPELINE_INDEX_OUT_OF_BOUNDS",
            Self::UnknownMiddleware(_) => "UNKNOWN_MIDDLEWARE",
            Self::GroupCycle(_) => "MIDDLEWARE_GROUP_CYCLE",
            Self::InvalidArguments { .. } => "INVALID_MIDDLEWARE_ARGUMENTS",
        }
    }
}

/// Anything that ends a chain without a normal response.
#[derive(Debug, Error)]
pub enum Fault {
    /// Request rejected by middleware or handler.
    #[error(transparent)]
    Middleware(#[from] MiddlewareFault),

    /// Pipeline defect.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The client went away; no response is written.
    #[error("client disconnected")]
    Aborted,
}

impl Fault {
    /// HTTP status for the rendered response.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Middleware(fault) => fault.status_code(),
            Self::Pipeline(_) | Self::Aborted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Self::Middleware(MiddlewareFault::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_kinds_are_client_errors() {
        let kinds = [
            TranslationErrorKind::MalformedHeader,
            TranslationErrorKind::TooManyHeaders,
            TranslationErrorKind::MalformedQuery,
            TranslationErrorKind::MalformedBody,
            TranslationErrorKind::UnexpectedBody,
            TranslationErrorKind::PayloadTooLarge,
            TranslationErrorKind::UnsupportedMediaType,
            TranslationErrorKind::UnsupportedMethod,
        ];
        for kind in kinds {
            assert!(kind.status_code().is_client_error(), "{kind:?}");
        }
        assert_eq!(
            TranslationErrorKind::ContentLengthMismatch.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_fault_category_status() {
        assert_eq!(FaultCategory::Unauthenticated.status_code(), 401);
        assert_eq!(FaultCategory::Forbidden.status_code(), 403);
        assert_eq!(FaultCategory::NotFound.status_code(), 404);
        assert_eq!(FaultCategory::BadInput.status_code(), 400);
        assert_eq!(FaultCategory::TooManyRequests.status_code(), 429);
        assert_eq!(FaultCategory::Internal.status_code(), 500);
    }

    #[test]
    fn test_too_many_requests_sets_retry_after() {
        let fault = MiddlewareFault::too_many_requests("slow down", 42);
        assert_eq!(fault.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_index_out_of_bounds_message() {
        let err = PipelineError::IndexOutOfBounds { index: 3, len: 2 };
        assert!(err.to_string().contains("index out of bounds"));
        assert_eq!(Fault::from(err).status_code(), 500);
    }

    #[test]
    fn test_anyhow_becomes_internal() {
        let fault = Fault::from(anyhow::anyhow!("database unavailable"));
        assert_eq!(fault.status_code(), 500);
        match fault {
            Fault::Middleware(f) => {
                assert_eq!(f.category(), FaultCategory::Internal);
                assert!(std::error::Error::source(&f).is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unauthenticated_with_redirect() {
        let fault = MiddlewareFault::unauthenticated("login required").with_redirect("/admin/login");
        assert_eq!(fault.redirect_to(), Some("/admin/login"));
        assert_eq!(fault.to_string(), "UNAUTHENTICATED: login required");
    }
}
