//! Error rendering.
//!
//! Every failure that ends a request becomes a well-formed response. JSON
//! clients (an `Accept` naming JSON, or `X-Requested-With: XMLHttpRequest`)
//! receive the envelope:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "UNAUTHENTICATED",
//!     "message": "login required",
//!     "request_id": "0192..."
//!   }
//! }
//! ```
//!
//! Everyone else receives a small HTML page, or a redirect when the fault
//! carries one.

use http::header::HeaderMap;
use http::StatusCode;
use portico_core::negotiate::{negotiate, ResponseFormat};
use portico_core::{
    escape_html, MiddlewareFault, OutboundMessage, PipelineError, RequestId, TranslationError,
};

const DEFAULT_INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Turns faults into responses, honouring content negotiation.
#[derive(Debug, Clone)]
pub struct ErrorRenderer {
    expose_internal_errors: bool,
    internal_error_message: String,
}

impl Default for ErrorRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRenderer {
    /// A renderer that hides internal error details.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: DEFAULT_INTERNAL_MESSAGE.to_string(),
        }
    }

    /// Whether 5xx responses carry the real error message.
    ///
    /// Development only.
    #[must_use]
    pub const fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Message shown for hidden internal errors.
    #[must_use]
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Renders a middleware or handler fault.
    #[must_use]
    pub fn render_fault(
        &self,
        fault: &MiddlewareFault,
        request_headers: &HeaderMap,
        request_id: RequestId,
    ) -> OutboundMessage {
        let format = negotiate(request_headers);
        let mut response = match (format, fault.redirect_to()) {
            (ResponseFormat::Html, Some(location)) => OutboundMessage::redirect(location),
            _ => self.render(
                format,
                fault.status_code(),
                fault.category().code(),
                fault.message(),
                request_id,
            ),
        };
        for (name, value) in fault.headers() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }

    /// Renders a pipeline defect as a 500.
    #[must_use]
    pub fn render_pipeline_error(
        &self,
        err: &PipelineError,
        request_headers: &HeaderMap,
        request_id: RequestId,
    ) -> OutboundMessage {
        self.render(
            negotiate(request_headers),
            StatusCode::INTERNAL_SERVER_ERROR,
            err.code(),
            &err.to_string(),
            request_id,
        )
    }

    /// Renders a request that could not be translated.
    #[must_use]
    pub fn render_translation_error(
        &self,
        err: &TranslationError,
        request_headers: &HeaderMap,
        request_id: RequestId,
    ) -> OutboundMessage {
        self.render(
            negotiate(request_headers),
            err.status_code(),
            err.kind.code(),
            &err.to_string(),
            request_id,
        )
    }

    /// Renders a 404 for a request no route accepted.
    #[must_use]
    pub fn render_not_found(
        &self,
        message: &str,
        request_headers: &HeaderMap,
        request_id: RequestId,
    ) -> OutboundMessage {
        self.render(
            negotiate(request_headers),
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            message,
            request_id,
        )
    }

    /// Renders an error in the given format.
    #[must_use]
    pub fn render(
        &self,
        format: ResponseFormat,
        status: StatusCode,
        code: &str,
        message: &str,
        request_id: RequestId,
    ) -> OutboundMessage {
        let message = if status.is_server_error() && !self.expose_internal_errors {
            self.internal_error_message.as_str()
        } else {
            message
        };

        match format {
            ResponseFormat::Json => {
                let body = serde_json::json!({
                    "error": {
                        "code": code,
                        "message": message,
                        "request_id": request_id.to_string(),
                    }
                });
                OutboundMessage::json_value(status, &body)
            }
            ResponseFormat::Html => {
                let title = format!(
                    "{} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Error")
                );
                let page = format!(
                    "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\" />\n\
                     <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n\
                     <p>{}</p>\n<p><small>Request ID: {request_id}</small></p>\n</body>\n</html>",
                    escape_html(message)
                );
                OutboundMessage::html(status, page)
            }
        }
    }
}
