//! Middleware reload on configuration change.
//!
//! Watches the configuration file and, whenever it changes, reloads it,
//! rebuilds the middleware registry and publishes a new routing
//! generation. A file that fails to parse or validate, or a registry that
//! leaves a route's middleware unresolved, is logged and ignored; the
//! running generation keeps serving.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use portico_config::{ConfigLoader, FileChangeKind, FileWatcher, PorticoConfig};
use portico_middleware::MiddlewareRegistry;
use portico_telemetry::metrics;
use tracing::{error, info, warn};

use crate::error::{ReloadError, ServerError};
use crate::kernel::Kernel;
use crate::shutdown::ShutdownSignal;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Reloads a kernel's middleware from a configuration file.
pub struct ConfigReloader<F> {
    kernel: Arc<Kernel>,
    path: PathBuf,
    env_prefix: Option<String>,
    debounce: Duration,
    rebuild: F,
}

impl<F> std::fmt::Debug for ConfigReloader<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigReloader")
            .field("path", &self.path)
            .field("env_prefix", &self.env_prefix)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl<F> ConfigReloader<F>
where
    F: FnMut(&PorticoConfig) -> MiddlewareRegistry + Send,
{
    /// Reloads `kernel` from `path`, building each registry with `rebuild`.
    ///
    /// [`registry_from_config`](crate::settings::registry_from_config) is
    /// the usual body of `rebuild`.
    pub fn new(kernel: Arc<Kernel>, path: impl Into<PathBuf>, rebuild: F) -> Self {
        Self {
            kernel,
            path: path.into(),
            env_prefix: None,
            debounce: DEFAULT_DEBOUNCE,
            rebuild,
        }
    }

    /// Applies `PREFIX_*` environment overrides on every load.
    #[must_use]
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Minimum spacing between reloads.
    #[must_use]
    pub const fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file and publishes a new generation.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError` if the file is invalid or the rebuilt registry
    /// does not resolve; the running generation is kept.
    pub fn reload_now(&mut self) -> Result<u64, ReloadError> {
        let config = match self.load() {
            Ok(config) => config,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "configuration reload failed");
                metrics::record_reload(false);
                return Err(err);
            }
        };
        let registry = (self.rebuild)(&config);
        self.kernel.reload_middleware(registry)
    }

    fn load(&self) -> Result<PorticoConfig, ReloadError> {
        let mut loader = ConfigLoader::new().with_file(&self.path)?;
        if let Some(prefix) = &self.env_prefix {
            loader = loader.with_env_prefix(prefix);
        }
        Ok(loader.load()?)
    }

    /// Reloads on every change until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the watcher cannot be started.
    pub async fn watch(mut self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let mut watcher = FileWatcher::builder()
            .debounce(self.debounce)
            .watch_path(&self.path)?
            .build()?;
        info!(path = %self.path.display(), "watching configuration");

        loop {
            tokio::select! {
                event = watcher.next() => match event {
                    Some(event) if event.kind == FileChangeKind::Deleted => {
                        warn!(path = %event.path.display(), "configuration file removed, keeping current routing");
                    }
                    Some(_) => {
                        if let Ok(generation) = self.reload_now() {
                            info!(generation, "configuration applied");
                        }
                    }
                    None => {
                        warn!("configuration watcher stopped");
                        break;
                    }
                },
                () = shutdown.recv() => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings;
    use portico_core::{ChainResult, OutboundMessage};
    use portico_middleware::stages::InMemorySessionStore;
    use portico_middleware::{handler_fn, Builtins, PipelineContext};
    use portico_router::RouteTable;

    fn ok() -> crate::kernel::HandlerRef {
        Arc::new(handler_fn(|_: &mut PipelineContext| async {
            ChainResult::Ok(OutboundMessage::text(http::StatusCode::OK, "ok"))
        }))
    }

    const PANEL: &str = r#"
[middleware]
global = [{ id = "request_id", priority = 0 }]

[middleware.groups]
panel = ["auth", "verified"]
"#;

    fn write(file: &tempfile::NamedTempFile, content: &str) {
        std::fs::write(file.path(), content).unwrap();
    }

    #[test]
    fn test_reload_keeps_generation_on_failure() {
        let sessions: Arc<InMemorySessionStore> = Arc::new(InMemorySessionStore::new());
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write(&file, PANEL);

        let mut routes = RouteTable::new();
        routes
            .register(
                portico_core::Method::Get,
                "/admin",
                "admin.dashboard",
                ["panel"],
                ok(),
            )
            .unwrap();

        let initial = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        let kernel = Arc::new(
            crate::kernel::KernelBuilder::from_config(&initial, sessions.clone())
                .unwrap()
                .routes(routes)
                .build()
                .unwrap(),
        );
        assert_eq!(kernel.routing().generation(), 1);

        let store = Arc::clone(&sessions);
        let mut reloader = ConfigReloader::new(Arc::clone(&kernel), file.path(), move |config: &PorticoConfig| {
            settings::registry_from_config(
                config,
                Builtins::new(store.clone()),
                |_| {},
            )
        });

        assert_eq!(reloader.reload_now().unwrap(), 2);

        write(&file, "[middleware]\nglobal = []\n");
        assert!(matches!(
            reloader.reload_now(),
            Err(ReloadError::Pipeline { .. })
        ));
        assert_eq!(kernel.routing().generation(), 2);

        write(&file, "[middleware\n");
        assert!(matches!(reloader.reload_now(), Err(ReloadError::Config(_))));
        assert_eq!(kernel.routing().generation(), 2);
    }
}
