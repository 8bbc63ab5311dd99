//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use portico_telemetry::LogFormat;
use tracing::debug;

use crate::{ConfigError, PorticoConfig};

/// Configuration loader.
///
/// Layers, later ones winning:
/// 1. Defaults or a preset
/// 2. A TOML or JSON file (replaces the starting point; unset fields take
///    their defaults)
/// 3. A `.env` file
/// 4. `PREFIX_SECTION_KEY` environment variables
///
/// # Example
///
/// ```
/// use portico_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_string("[server]\nhttp_addr = \"127.0.0.1:3000\"", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: PorticoConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PorticoConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = PorticoConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed
    /// or has an unsupported extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        self.config = parse(&content, &format)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok(self)
    }

    /// Loads a file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file) when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Loads `.env` from the working directory into the process
    /// environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env file");
        }
        self
    }

    /// Enables environment overrides named `PREFIX_SECTION_KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<PorticoConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let start = format!("{prefix}_");
            let vars: Vec<(String, String)> =
                env::vars().filter(|(k, _)| k.starts_with(&start)).collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PorticoConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(name) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix('_'))
        else {
            return Ok(());
        };

        let config = &mut self.config;
        match name {
            "SERVER_HTTP_ADDR" => config.server.http_addr = value.to_string(),
            "SERVER_SHUTDOWN_TIMEOUT_SECS" => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            "SERVER_REQUEST_TIMEOUT_MS" => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            "SERVER_KEEP_ALIVE" => config.server.keep_alive = parse_flag(key, value)?,

            "TRANSLATOR_MAX_HEADERS" => config.translator.max_headers = parse_number(key, value)?,
            "TRANSLATOR_MAX_BODY_SIZE" => {
                config.translator.max_body_size = parse_number(key, value)?;
            }
            "TRANSLATOR_MAX_FILE_SIZE" => {
                config.translator.max_file_size = parse_number(key, value)?;
            }
            "TRANSLATOR_UPLOAD_DIR" => {
                config.translator.upload_dir = non_empty(value).map(Into::into);
            }
            "TRANSLATOR_TRUSTED_PROXIES" => {
                config.translator.trusted_proxies = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }

            "MIDDLEWARE_SESSION_COOKIE" => config.middleware.session_cookie = value.to_string(),
            "MIDDLEWARE_LOGIN_PATH" => config.middleware.login_path = non_empty(value),
            "MIDDLEWARE_HOME_PATH" => config.middleware.home_path = value.to_string(),
            "MIDDLEWARE_TRUST_REQUEST_ID" => {
                config.middleware.trust_request_id = parse_flag(key, value)?;
            }

            "LOGGING_ENABLED" => config.logging.enabled = parse_flag(key, value)?,
            "LOGGING_LEVEL" => config.logging.level = value.to_string(),
            "LOGGING_FORMAT" => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    "compact" => LogFormat::Compact,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json', 'pretty' or 'compact'",
                        ))
                    }
                };
            }

            "DIAGNOSTICS_ROUTES_PATH" => config.diagnostics.routes_path = non_empty(value),
            "DIAGNOSTICS_EXPOSE_INTERNAL_ERRORS" => {
                config.diagnostics.expose_internal_errors = parse_flag(key, value)?;
            }

            _ => debug!(var = key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<PorticoConfig, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
