//! `application/x-www-form-urlencoded` decoding for query strings and form bodies.

use portico_core::{InboundMessage, ParamBag, TranslationError, TranslationErrorKind};
use serde::de::DeserializeOwned;

/// Decodes a urlencoded string into ordered pairs.
///
/// Fails on a `%` not followed by two hex digits, or on escapes that decode
/// to invalid UTF-8. `kind` selects the error reported.
pub fn parse_pairs(input: &str, kind: TranslationErrorKind) -> Result<ParamBag, TranslationError> {
    validate(input).map_err(|detail| TranslationError::new(kind, detail))?;
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(input)
        .map_err(|e| TranslationError::new(kind, e.to_string()))?;
    Ok(ParamBag::from(pairs))
}

fn validate(input: &str) -> Result<(), String> {
    for component in input.split(['&', '=']) {
        let bytes = component.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let valid = bytes.len() > i + 2
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    return Err(format!("invalid percent-escape in '{component}'"));
                }
                i += 3;
            } else {
                i += 1;
            }
        }
        let plus_as_space = component.replace('+', " ");
        if urlencoding::decode(&plus_as_space).is_err() {
            return Err(format!("'{component}' does not decode to UTF-8"));
        }
    }
    Ok(())
}

/// Deserializes the query string into `T`.
///
/// ```rust
/// use portico_core::{InboundMessage, Method};
/// use portico_translate::query_as;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Listing {
///     page: u32,
///     #[serde(default)]
///     search: Option<String>,
/// }
///
/// let msg = InboundMessage::builder(Method::Get, "/admin/users")
///     .query_string("page=2")
///     .build();
/// let listing: Listing = query_as(&msg).unwrap();
/// assert_eq!(listing.page, 2);
/// assert!(listing.search.is_none());
/// ```
pub fn query_as<T: DeserializeOwned>(msg: &InboundMessage) -> Result<T, TranslationError> {
    serde_urlencoded::from_str(msg.query_string().unwrap_or(""))
        .map_err(|e| TranslationError::new(TranslationErrorKind::MalformedQuery, e.to_string()))
}

/// Deserializes the decoded form fields into `T`.
///
/// Works for both urlencoded and multipart bodies.
pub fn form_as<T: DeserializeOwned>(msg: &InboundMessage) -> Result<T, TranslationError> {
    let pairs: Vec<(&str, &str)> = msg.form().iter().collect();
    let encoded = serde_urlencoded::to_string(pairs)
        .map_err(|e| TranslationError::new(TranslationErrorKind::MalformedBody, e.to_string()))?;
    serde_urlencoded::from_str(&encoded)
        .map_err(|e| TranslationError::new(TranslationErrorKind::MalformedBody, e.to_string()))
}

/// Deserializes the parsed JSON body into `T`.
pub fn json_as<T: DeserializeOwned>(msg: &InboundMessage) -> Result<T, TranslationError> {
    let value = msg.json().cloned().ok_or_else(|| {
        TranslationError::new(TranslationErrorKind::MalformedBody, "request has no JSON body")
    })?;
    serde_json::from_value(value)
        .map_err(|e| TranslationError::new(TranslationErrorKind::MalformedBody, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::Method;
    use serde::Deserialize;

    #[test]
    fn test_parse_pairs_keeps_order_and_repeats() {
        let bag = parse_pairs("tag=a&name=J%C3%BCrgen+M&tag=b&flag", TranslationErrorKind::MalformedQuery)
            .unwrap();
        assert_eq!(bag.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(bag.get("name"), Some("Jürgen M"));
        assert_eq!(bag.get("flag"), Some(""));
    }

    #[test]
    fn test_parse_pairs_rejects_bad_escapes() {
        for bad in ["a=%zz", "a=%4", "a=%", "%C3%28=x"] {
            let err = parse_pairs(bad, TranslationErrorKind::MalformedQuery).unwrap_err();
            assert_eq!(err.kind, TranslationErrorKind::MalformedQuery, "{bad}");
        }
        let err = parse_pairs("a=%zz", TranslationErrorKind::MalformedBody).unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::MalformedBody);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_pairs("", TranslationErrorKind::MalformedQuery).unwrap().is_empty());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        email: String,
        remember: Option<String>,
    }

    #[test]
    fn test_form_as() {
        let mut form = ParamBag::new();
        form.push("email", "a@b.test");
        let msg = InboundMessage::builder(Method::Post, "/login").form(form).build();
        let login: Login = form_as(&msg).unwrap();
        assert_eq!(
            login,
            Login {
                email: "a@b.test".to_string(),
                remember: None
            }
        );
    }

    #[test]
    fn test_json_as_requires_body() {
        let msg = InboundMessage::builder(Method::Post, "/login").build();
        let err = json_as::<Login>(&msg).unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::MalformedBody);

        let msg = InboundMessage::builder(Method::Post, "/login")
            .json(serde_json::json!({"email": "x@y.test", "remember": "on"}))
            .build();
        let login: Login = json_as(&msg).unwrap();
        assert_eq!(login.remember.as_deref(), Some("on"));
    }
}
