//! Compiled path patterns.

use std::borrow::Cow;
use std::fmt;

use crate::error::RouteError;
use crate::params::Params;

/// A segment of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// A literal segment (e.g. `resources`).
    Literal(String),
    /// A parameter segment (e.g. `{id}`), holding the name without braces.
    Param(String),
}

/// A path pattern compiled into segment matchers.
///
/// Empty segments are dropped both here and in matched paths, so
/// `/admin/users/` and `/admin//users` match the pattern `/admin/users`.
/// The single-segment pattern `*` is the catch-all used by the fallback
/// route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    catch_all: bool,
    normalized: String,
}

impl PathPattern {
    /// Compiles a pattern.
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        if pattern.trim() == "*" {
            return Ok(Self {
                segments: Vec::new(),
                catch_all: true,
                normalized: "*".to_string(),
            });
        }

        let mut segments = Vec::new();
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            segments.push(parse_segment(pattern, raw)?);
        }

        let mut seen: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if seen.contains(&name.as_str()) {
                    return Err(RouteError::invalid(
                        pattern,
                        format!("parameter '{name}' appears twice"),
                    ));
                }
                seen.push(name);
            }
        }

        let normalized = render_normalized(&segments);
        Ok(Self {
            segments,
            catch_all: false,
            normalized,
        })
    }

    /// `true` for the `*` catch-all.
    #[must_use]
    pub const fn is_catch_all(&self) -> bool {
        self.catch_all
    }

    /// The pattern with empty segments removed and a leading `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Names of the `{name}` segments in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches already split and decoded path segments.
    pub(crate) fn match_segments(&self, path: &[Cow<'_, str>]) -> Option<Params> {
        if self.catch_all {
            return Some(Params::new());
        }
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (pattern, actual) in self.segments.iter().zip(path) {
            match pattern {
                Segment::Literal(expected) => {
                    if expected.as_str() != actual.as_ref() {
                        return None;
                    }
                }
                Segment::Param(name) => params.push(name.clone(), actual.as_ref()),
            }
        }
        Some(params)
    }

    /// Matches a raw request path.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Params> {
        self.match_segments(&split_path(path))
    }

    /// Substitutes parameter values, percent-encoding them.
    ///
    /// `route` only labels the error.
    pub fn render<'a, F>(&self, route: &str, mut lookup: F) -> Result<String, RouteError>
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        if self.catch_all {
            return Ok("/".to_string());
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(name) => {
                    let value = lookup(name).ok_or_else(|| RouteError::MissingParameter {
                        route: route.to_string(),
                        param: name.clone(),
                    })?;
                    out.push_str(&urlencoding::encode(value));
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

fn parse_segment(pattern: &str, raw: &str) -> Result<Segment, RouteError> {
    if let Some(inner) = raw.strip_prefix('{') {
        let name = inner
            .strip_suffix('}')
            .ok_or_else(|| RouteError::invalid(pattern, format!("unclosed parameter in '{raw}'")))?;
        if name.is_empty() {
            return Err(RouteError::invalid(pattern, "empty parameter name"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RouteError::invalid(
                pattern,
                format!("parameter name '{name}' must be alphanumeric"),
            ));
        }
        return Ok(Segment::Param(name.to_string()));
    }
    if raw.contains(['{', '}']) {
        return Err(RouteError::invalid(
            pattern,
            format!("parameters must span a whole segment, found '{raw}'"),
        ));
    }
    if raw == "*" {
        return Err(RouteError::invalid(
            pattern,
            "'*' is only valid as the whole fallback pattern",
        ));
    }
    Ok(Segment::Literal(raw.to_string()))
}

fn render_normalized(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        match segment {
            Segment::Literal(lit) => out.push_str(lit),
            Segment::Param(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
    }
    out
}

/// Splits a request path into percent-decoded, non-empty segments.
///
/// Segments that do not decode to UTF-8 are kept verbatim.
pub(crate) fn split_path(path: &str) -> Vec<Cow<'_, str>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).unwrap_or(Cow::Borrowed(s)))
        .collect()
}
