//! Root configuration type.

use std::net::{IpAddr, SocketAddr};

use portico_telemetry::{logging::create_env_filter, LogConfig};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DiagnosticsSection, MiddlewareSection, ServerSection, TranslatorSection};

/// Complete Portico configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use portico_config::PorticoConfig;
///
/// let config = PorticoConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PorticoConfig {
    /// HTTP server.
    #[serde(default)]
    pub server: ServerSection,

    /// Message translator limits.
    #[serde(default)]
    pub translator: TranslatorSection,

    /// Middleware registry input.
    #[serde(default)]
    pub middleware: MiddlewareSection,

    /// Logging.
    #[serde(default)]
    pub logging: LogConfig,

    /// Diagnostics.
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
}

impl PorticoConfig {
    /// Development preset: pretty debug logs and exposed internal errors.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LogConfig::development(),
            diagnostics: DiagnosticsSection {
                routes_path: Some("/_portico/routes".to_string()),
                expose_internal_errors: true,
            },
            ..Self::default()
        }
    }

    /// Production preset: JSON logs, internal errors hidden.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            ..Self::default()
        }
    }

    /// Bind address as a socket address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the address does not parse.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })
    }

    /// Trusted proxy addresses.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first entry that is not an
    /// IP address.
    pub fn trusted_proxies(&self) -> Result<Vec<IpAddr>, ConfigError> {
        self.translator
            .trusted_proxies
            .iter()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ConfigError::invalid_value(
                        "translator.trusted_proxies",
                        format!("invalid IP address: {raw}"),
                    )
                })
            })
            .collect()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError::InvalidValue` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_addr()?;
        self.trusted_proxies()?;

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }

        let translator = &self.translator;
        if translator.max_body_size == 0 {
            return Err(ConfigError::invalid_value(
                "translator.max_body_size",
                "must be greater than zero",
            ));
        }
        if translator.max_file_size > translator.max_body_size {
            return Err(ConfigError::invalid_value(
                "translator.max_file_size",
                "must not exceed translator.max_body_size",
            ));
        }

        let middleware = &self.middleware;
        if let Some(entry) = middleware.global.iter().find(|g| g.id.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "middleware.global",
                format!("empty middleware id (priority {})", entry.priority),
            ));
        }
        for (name, members) in &middleware.groups {
            if name.is_empty() || members.iter().any(|m| m.trim().is_empty()) {
                return Err(ConfigError::invalid_value(
                    format!("middleware.groups.{name}"),
                    "group names and members must not be empty",
                ));
            }
        }
        for (alias, target) in &middleware.aliases {
            if target.is_empty() || alias == target {
                return Err(ConfigError::invalid_value(
                    format!("middleware.aliases.{alias}"),
                    "alias must name a different middleware",
                ));
            }
        }
        if middleware.session_cookie.is_empty() {
            return Err(ConfigError::invalid_value(
                "middleware.session_cookie",
                "must not be empty",
            ));
        }

        let paths = [
            ("middleware.login_path", middleware.login_path.as_deref()),
            ("middleware.home_path", Some(middleware.home_path.as_str())),
            (
                "middleware.verify_notice_path",
                middleware.verify_notice_path.as_deref(),
            ),
            (
                "diagnostics.routes_path",
                self.diagnostics.routes_path.as_deref(),
            ),
        ];
        for (field, path) in paths {
            if let Some(path) = path {
                if !path.starts_with('/') {
                    return Err(ConfigError::invalid_value(field, "must start with '/'"));
                }
            }
        }

        create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalMiddleware;

    #[test]
    fn test_default_is_valid() {
        assert!(PorticoConfig::default().validate().is_ok());
        assert!(PorticoConfig::development().validate().is_ok());
        assert!(PorticoConfig::production().validate().is_ok());
    }

    #[test]
    fn test_development_preset() {
        let config = PorticoConfig::development();
        assert_eq!(config.logging.level, "debug");
        assert!(config.diagnostics.expose_internal_errors);
        assert_eq!(
            config.diagnostics.routes_path.as_deref(),
            Some("/_portico/routes")
        );
    }

    #[test]
    fn test_invalid_addr() {
        let mut config = PorticoConfig::default();
        config.server.http_addr = "localhost".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_invalid_trusted_proxy() {
        let mut config = PorticoConfig::default();
        config.translator.trusted_proxies = vec!["10.0.0.1".to_string(), "gateway".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gateway"));
    }

    #[test]
    fn test_trusted_proxies_parsed() {
        let mut config = PorticoConfig::default();
        config.translator.trusted_proxies = vec!["10.0.0.1".to_string(), "::1".to_string()];
        let proxies = config.trusted_proxies().unwrap();
        assert_eq!(proxies.len(), 2);
        assert!(proxies[1].is_loopback());
    }

    #[test]
    fn test_file_size_bounded_by_body_size() {
        let mut config = PorticoConfig::default();
        config.translator.max_body_size = 1024;
        config.translator.max_file_size = 2048;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("translator.max_file_size"));
    }

    #[test]
    fn test_empty_global_id() {
        let mut config = PorticoConfig::default();
        config.middleware.global.push(GlobalMiddleware::new(" ", 5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_self_alias_rejected() {
        let mut config = PorticoConfig::default();
        config
            .middleware
            .aliases
            .insert("auth".to_string(), "auth".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut config = PorticoConfig::default();
        config.middleware.login_path = Some("login".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("middleware.login_path"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = PorticoConfig::default();
        config.logging.level = "portico=loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<PorticoConfig, _> = toml::from_str("[telemetry]\nenabled = true");
        assert!(result.is_err());
    }
}
