//! Configuration sections.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// HTTP server section.
///
/// # Example
///
/// ```
/// use portico_config::ServerSection;
///
/// let server = ServerSection::default();
/// assert_eq!(server.http_addr, "0.0.0.0:8080");
/// assert_eq!(server.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address (e.g. "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Seconds to wait for in-flight connections on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout in milliseconds. Zero disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Whether HTTP/1.1 keep-alive is enabled.
    #[serde(default = "default_true")]
    pub keep_alive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            keep_alive: true,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Message translator section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorSection {
    /// Maximum number of header values per request.
    pub max_headers: usize,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum number of multipart text fields.
    pub max_fields: usize,

    /// Maximum number of multipart files.
    pub max_files: usize,

    /// Maximum size of one uploaded file in bytes.
    pub max_file_size: usize,

    /// Where uploads are spooled; the system temp dir when unset.
    pub upload_dir: Option<PathBuf>,

    /// Content types kept as raw bodies. `type/*` matches any subtype.
    pub raw_body_types: Vec<String>,

    /// Peers whose `X-Forwarded-*` headers are honoured.
    pub trusted_proxies: Vec<String>,

    /// Value of `DOCUMENT_ROOT`.
    pub document_root: String,

    /// Value of `SCRIPT_NAME`.
    pub script_name: String,
}

impl Default for TranslatorSection {
    fn default() -> Self {
        Self {
            max_headers: 100,
            max_body_size: 8 * 1024 * 1024,
            max_fields: 1000,
            max_files: 20,
            max_file_size: 2 * 1024 * 1024,
            upload_dir: None,
            raw_body_types: vec![
                "text/*".to_string(),
                "application/xml".to_string(),
                "application/octet-stream".to_string(),
            ],
            trusted_proxies: Vec::new(),
            document_root: "public".to_string(),
            script_name: "/index.php".to_string(),
        }
    }
}

/// A middleware applied to every route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalMiddleware {
    /// Middleware spec (`id` or `id:arg,arg`), alias or group name.
    pub id: String,

    /// Lower runs first. Ties keep declaration order.
    #[serde(default)]
    pub priority: i32,
}

impl GlobalMiddleware {
    /// Creates an entry.
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            priority,
        }
    }
}

/// Middleware registry section.
///
/// Read-only input: the server turns it into global entries, groups and
/// aliases on a `MiddlewareRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareSection {
    /// Global middleware.
    pub global: Vec<GlobalMiddleware>,

    /// Named groups, in declaration order.
    pub groups: IndexMap<String, Vec<String>>,

    /// Alias to middleware id.
    pub aliases: BTreeMap<String, String>,

    /// Name of the session cookie read by `auth`, `guest` and `verified`.
    pub session_cookie: String,

    /// Where unauthenticated HTML requests are redirected.
    pub login_path: Option<String>,

    /// Where `guest` sends signed-in users.
    pub home_path: String,

    /// Where unverified HTML requests are redirected.
    pub verify_notice_path: Option<String>,

    /// Whether an incoming `X-Request-Id` is reused.
    pub trust_request_id: bool,
}

impl Default for MiddlewareSection {
    fn default() -> Self {
        Self {
            global: vec![GlobalMiddleware::new("request_id", 0)],
            groups: IndexMap::new(),
            aliases: BTreeMap::new(),
            session_cookie: "portico_session".to_string(),
            login_path: None,
            home_path: "/".to_string(),
            verify_notice_path: None,
            trust_request_id: false,
        }
    }
}

/// Diagnostics section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsSection {
    /// Path serving the route table as JSON. Disabled when unset.
    pub routes_path: Option<String>,

    /// Whether 5xx error bodies carry the real message.
    pub expose_internal_errors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ServerSection::default();
        assert_eq!(server.request_timeout_ms, 30_000);
        assert!(server.keep_alive);
    }

    #[test]
    fn test_middleware_section_from_toml() {
        let section: MiddlewareSection = toml::from_str(
            r#"
            login_path = "/login"
            global = [{ id = "request_id" }, { id = "throttle:120", priority = 10 }]

            [groups]
            web = ["auth", "verified"]
            admin = ["web", "throttle:60,1"]

            [aliases]
            signed-in = "auth"
            "#,
        )
        .unwrap();

        assert_eq!(section.global[1], GlobalMiddleware::new("throttle:120", 10));
        assert_eq!(section.global[0].priority, 0);
        let names: Vec<_> = section.groups.keys().cloned().collect();
        assert_eq!(names, ["web", "admin"]);
        assert_eq!(section.aliases["signed-in"], "auth");
        assert_eq!(section.login_path.as_deref(), Some("/login"));
        assert_eq!(section.session_cookie, "portico_session");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<TranslatorSection, _> = toml::from_str("max_body = 10");
        assert!(result.is_err());
    }

    #[test]
    fn test_diagnostics_disabled_by_default() {
        let section = DiagnosticsSection::default();
        assert!(section.routes_path.is_none());
        assert!(!section.expose_internal_errors);
    }
}
