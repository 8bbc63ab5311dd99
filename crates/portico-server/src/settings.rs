//! Turning a [`PorticoConfig`] into kernel parts.

use std::sync::Arc;

use portico_config::{ConfigError, DiagnosticsSection, MiddlewareSection, PorticoConfig};
use portico_core::Container;
use portico_middleware::stages::SessionStore;
use portico_middleware::{Builtins, ErrorRenderer, MiddlewareRegistry};
use portico_translate::{MultipartLimits, TranslatorConfig};

use crate::kernel::KernelBuilder;

/// Translator limits from the `[translator]` section.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for an unparsable trusted proxy.
pub fn translator_config(config: &PorticoConfig) -> Result<TranslatorConfig, ConfigError> {
    let section = &config.translator;
    let mut translator = TranslatorConfig::new()
        .max_headers(section.max_headers)
        .max_body_size(section.max_body_size)
        .multipart(MultipartLimits {
            max_fields: section.max_fields,
            max_files: section.max_files,
            max_file_size: section.max_file_size,
        });
    if let Some(dir) = &section.upload_dir {
        translator = translator.upload_dir(dir.clone());
    }
    for proxy in config.trusted_proxies()? {
        translator = translator.trust_proxy(proxy);
    }
    translator.raw_body_types = section.raw_body_types.clone();
    translator.document_root = section.document_root.clone();
    translator.script_name = section.script_name.clone();
    Ok(translator)
}

/// Error renderer from the `[diagnostics]` section.
#[must_use]
pub fn error_renderer(section: &DiagnosticsSection) -> ErrorRenderer {
    ErrorRenderer::new().expose_internal_errors(section.expose_internal_errors)
}

/// Built-in middleware settings from the `[middleware]` section.
#[must_use]
pub fn builtins(section: &MiddlewareSection, sessions: Arc<dyn SessionStore>) -> Builtins {
    let mut builtins = Builtins::new(sessions)
        .cookie_name(section.session_cookie.clone())
        .home_path(section.home_path.clone())
        .trust_request_id(section.trust_request_id);
    if let Some(path) = &section.login_path {
        builtins = builtins.login_path(path.clone());
    }
    if let Some(path) = &section.verify_notice_path {
        builtins = builtins.verify_notice_path(path.clone());
    }
    builtins
}

/// Adds the configured global list, groups and aliases.
pub fn apply_middleware_section(registry: &mut MiddlewareRegistry, section: &MiddlewareSection) {
    for entry in &section.global {
        registry.global(entry.id.clone(), entry.priority);
    }
    for (name, members) in &section.groups {
        registry.group(name.clone(), members.iter().cloned());
    }
    for (alias, target) in &section.aliases {
        registry.alias(alias.clone(), target.clone());
    }
}

/// A registry holding the built-ins plus the configured globals, groups
/// and aliases.
///
/// `extra` registers application middleware. The same inputs rebuild the
/// registry on every reload, so process singletons written to the scratch
/// container here are discarded; register those through
/// [`KernelBuilder::middleware`] instead.
pub fn registry_from_config<F>(
    config: &PorticoConfig,
    builtins: Builtins,
    extra: F,
) -> MiddlewareRegistry
where
    F: FnOnce(&mut MiddlewareRegistry),
{
    let mut registry = MiddlewareRegistry::new();
    let mut scratch = Container::new();
    builtins.install(&mut registry, &mut scratch);
    extra(&mut registry);
    apply_middleware_section(&mut registry, &config.middleware);
    registry
}

impl KernelBuilder {
    /// A builder configured from `config`, with the built-ins authenticating
    /// against `sessions`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the translator section is invalid.
    pub fn from_config(
        config: &PorticoConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::default()
            .translator(translator_config(config)?)
            .renderer(error_renderer(&config.diagnostics))
            .builtins(builtins(&config.middleware, sessions))
            .middleware(|registry, _| apply_middleware_section(registry, &config.middleware));
        if let Some(path) = &config.diagnostics.routes_path {
            builder = builder.route_diagnostics(path.clone());
        }
        Ok(builder)
    }
}
