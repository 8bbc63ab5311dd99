//! Content negotiation for error and redirect rendering.

use http::header::{HeaderMap, ACCEPT};

/// How a response for a request should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// JSON envelope.
    Json,
    /// Small HTML page.
    Html,
}

/// `true` when an `Accept` value names a JSON media type.
#[must_use]
pub fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| {
            accept
                .split(',')
                .map(|part| part.split(';').next().unwrap_or("").trim())
                .any(|media| media.ends_with("/json") || media.ends_with("+json"))
        })
}

/// `true` for `X-Requested-With: XMLHttpRequest`.
#[must_use]
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

/// `true` if the client should receive JSON rather than HTML.
#[must_use]
pub fn expects_json(headers: &HeaderMap) -> bool {
    wants_json(headers) || is_ajax(headers)
}

/// Picks the response format for a request's headers.
#[must_use]
pub fn negotiate(headers: &HeaderMap) -> ResponseFormat {
    if expects_json(headers) {
        ResponseFormat::Json
    } else {
        ResponseFormat::Html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_accept_json_variants() {
        assert!(wants_json(&headers(&[("accept", "application/json")])));
        assert!(wants_json(&headers(&[(
            "accept",
            "text/html, application/vnd.api+json;q=0.9"
        )])));
        assert!(!wants_json(&headers(&[("accept", "text/html,*/*")])));
        assert!(!wants_json(&HeaderMap::new()));
    }

    #[test]
    fn test_ajax_counts_as_json() {
        let h = headers(&[("x-requested-with", "XMLHttpRequest")]);
        assert!(expects_json(&h));
        assert_eq!(negotiate(&h), ResponseFormat::Json);
        assert_eq!(
            negotiate(&headers(&[("accept", "text/html")])),
            ResponseFormat::Html
        );
    }
}
