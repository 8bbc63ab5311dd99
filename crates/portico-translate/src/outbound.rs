//! [`OutboundMessage`] → runtime response.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use portico_core::{Body, Method, OutboundMessage, TranslationError, TranslationErrorKind};
use std::io;

use crate::inbound::Translator;

/// Body type handed to the runtime.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// An empty runtime body.
#[must_use]
pub fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A complete in-memory runtime body.
#[must_use]
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

impl Translator {
    /// Maps a framework response onto the runtime response for `method`.
    ///
    /// Byte bodies get a `Content-Length`. Streams without an explicit length
    /// are sent chunked. `HEAD` responses keep every header and drop the
    /// body; 1xx, 204 and 304 responses never carry one.
    ///
    /// # Errors
    ///
    /// [`TranslationErrorKind::ContentLengthMismatch`] when an explicit length
    /// disagrees with a buffered body.
    pub fn outbound(
        &self,
        msg: OutboundMessage,
        method: Method,
    ) -> Result<http::Response<ResponseBody>, TranslationError> {
        let (status, mut headers, body, explicit_len) = msg.into_parts();
        let bodiless = status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;

        let mut runtime_body = match body {
            Body::Empty => {
                check_length(explicit_len, 0)?;
                headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
                empty_body()
            }
            Body::Bytes(bytes) => {
                check_length(explicit_len, bytes.len() as u64)?;
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
                full_body(bytes)
            }
            Body::Stream(stream) => {
                match explicit_len {
                    Some(len) => {
                        headers.remove(TRANSFER_ENCODING);
                        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
                    }
                    None => {
                        headers.remove(CONTENT_LENGTH);
                        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                    }
                }
                StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
            }
        };

        if bodiless {
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
            runtime_body = empty_body();
        } else if method == Method::Head {
            runtime_body = empty_body();
        }

        let mut response = http::Response::new(runtime_body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn check_length(explicit: Option<u64>, actual: u64) -> Result<(), TranslationError> {
    match explicit {
        Some(declared) if declared != actual => Err(TranslationError::new(
            TranslationErrorKind::ContentLengthMismatch,
            format!("declared {declared} bytes but body has {actual}"),
        )),
        _ => Ok(()),
    }
}
