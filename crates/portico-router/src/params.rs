//! Path parameter storage.
//!
//! Admin routes capture one or two segments (`{resource}`, `{record}`), so
//! captures are kept inline and only spill to the heap for unusual patterns.

use std::str::FromStr;

use smallvec::SmallVec;

const INLINE_PARAMS: usize = 4;

/// Values captured from `{name}` segments, in pattern order.
///
/// Values are percent-decoded before they are stored.
///
/// ```rust
/// use portico_router::Params;
///
/// let mut params = Params::new();
/// params.push("resource", "articles");
/// params.push("record", "42");
///
/// assert_eq!(params.get("resource"), Some("articles"));
/// assert_eq!(params.parse::<u64>("record"), Some(Ok(42)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    captures: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// No captures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a capture. Patterns reject repeated names, so names are unique.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.captures.push((name.into(), value.into()));
    }

    /// The decoded value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v.as_str()))
    }

    /// Parses the value captured for `name`; `None` when nothing was captured.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<Result<T, T::Err>> {
        self.get(name).map(str::parse)
    }

    /// `true` for patterns without `{name}` segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Number of captures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    /// Captures in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captures.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let mut params = Params::new();
        params.push("resource", "articles");
        params.push("record", "7");

        assert_eq!(params.get("record"), Some("7"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 2);
        assert_eq!(
            params.iter().collect::<Vec<_>>(),
            vec![("resource", "articles"), ("record", "7")]
        );
    }

    #[test]
    fn test_parse_reports_bad_values() {
        let mut params = Params::new();
        params.push("record", "abc");

        assert!(matches!(params.parse::<u32>("record"), Some(Err(_))));
        assert!(params.parse::<u32>("page").is_none());
    }

    #[test]
    fn test_many_captures() {
        let mut params = Params::new();
        for i in 0..6 {
            params.push(format!("s{i}"), i.to_string());
        }
        assert_eq!(params.get("s5"), Some("5"));
        assert!(!params.is_empty());
    }
}
