//! File watching for configuration reloads.
//!
//! Wraps `notify` and turns raw file system events into debounced
//! [`FileChangeEvent`]s. The server uses it to rebuild the middleware
//! pipeline when the configuration file changes.
//!
//! ```no_run
//! use portico_config::FileWatcher;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), portico_config::ConfigError> {
//! let mut watcher = FileWatcher::builder()
//!     .debounce(Duration::from_millis(250))
//!     .watch_path("portico.toml")?
//!     .build()?;
//!
//! while let Some(event) = watcher.next().await {
//!     println!("{} changed", event.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::ConfigError;

const CHANNEL_CAPACITY: usize = 64;

/// A debounced change to a watched file.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Changed path.
    pub path: PathBuf,
    /// What happened.
    pub kind: FileChangeKind,
    /// When the change was seen.
    pub timestamp: Instant,
}

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Builder for [`FileWatcher`].
#[derive(Debug)]
pub struct FileWatcherBuilder {
    paths: Vec<PathBuf>,
    debounce: Duration,
    extensions: HashSet<String>,
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            debounce: Duration::from_millis(500),
            extensions: HashSet::new(),
        }
    }
}

impl FileWatcherBuilder {
    /// Changes to the same path within this window are coalesced.
    #[must_use]
    pub fn debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Adds a file or directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` if the path does not exist.
    pub fn watch_path<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        self.paths.push(path.to_path_buf());
        Ok(self)
    }

    /// Only report files with these extensions. Empty means all files.
    #[must_use]
    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Starts watching.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Watch` if no path was added or `notify` fails.
    pub fn build(self) -> Result<FileWatcher, ConfigError> {
        if self.paths.is_empty() {
            return Err(ConfigError::Watch("no paths to watch".to_string()));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // notify delivers on its own thread, so blocking_send is safe here.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        })
        .map_err(|e| ConfigError::Watch(e.to_string()))?;

        for path in &self.paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::Watch(format!("{}: {e}", path.display())))?;
        }

        Ok(FileWatcher {
            _watcher: watcher,
            rx,
            debounce: self.debounce,
            extensions: self.extensions,
            last_event: None,
        })
    }
}

/// Watches files and yields debounced change events.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    debounce: Duration,
    extensions: HashSet<String>,
    last_event: Option<(PathBuf, Instant)>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("debounce", &self.debounce)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::default()
    }

    /// Waits for the next change that survives filtering and debouncing.
    ///
    /// Returns `None` once the underlying watcher has stopped.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        while let Some(event) = self.rx.recv().await {
            if let Some(change) = self.accept(&event, Instant::now()) {
                return Some(change);
            }
        }
        None
    }

    fn accept(&mut self, event: &Event, now: Instant) -> Option<FileChangeEvent> {
        let kind = FileChangeKind::from_event(&event.kind)?;
        let path = event.paths.first()?.clone();

        if !self.extensions.is_empty() {
            let ext = path.extension().and_then(|e| e.to_str())?;
            if !self.extensions.contains(ext) {
                return None;
            }
        }

        if let Some((last_path, at)) = &self.last_event {
            if *last_path == path && now.duration_since(*at) < self.debounce {
                return None;
            }
        }
        self.last_event = Some((path.clone(), now));

        Some(FileChangeEvent {
            path,
            kind,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};
    use std::fs;
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    fn watcher_for(dir: &TempDir) -> FileWatcher {
        FileWatcher::builder()
            .debounce(Duration::from_millis(200))
            .watch_path(dir.path())
            .unwrap()
            .extensions(&["toml"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_paths() {
        let err = FileWatcher::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::Watch(_)));
    }

    #[test]
    fn test_watch_missing_path() {
        let err = FileWatcher::builder().watch_path("/nonexistent/portico.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_debounce_same_path() {
        let dir = TempDir::new().unwrap();
        let mut watcher = watcher_for(&dir);
        let path = dir.path().join("portico.toml");
        let modify = || EventKind::Modify(ModifyKind::Data(DataChange::Any));
        let start = Instant::now();

        assert!(watcher.accept(&event(modify(), &path), start).is_some());
        assert!(watcher
            .accept(&event(modify(), &path), start + Duration::from_millis(50))
            .is_none());
        let later = watcher
            .accept(&event(modify(), &path), start + Duration::from_millis(300))
            .unwrap();
        assert_eq!(later.kind, FileChangeKind::Modified);
    }

    #[test]
    fn test_filters_extension_and_kind() {
        let dir = TempDir::new().unwrap();
        let mut watcher = watcher_for(&dir);
        let now = Instant::now();

        let notes = dir.path().join("notes.txt");
        assert!(watcher
            .accept(&event(EventKind::Create(CreateKind::File), &notes), now)
            .is_none());

        let config = dir.path().join("portico.toml");
        assert!(watcher
            .accept(&event(EventKind::Access(AccessKind::Any), &config), now)
            .is_none());
        let created = watcher
            .accept(&event(EventKind::Create(CreateKind::File), &config), now)
            .unwrap();
        assert_eq!(created.kind, FileChangeKind::Created);
    }

    #[tokio::test]
    async fn test_detects_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portico.toml");
        fs::write(&path, "[server]").unwrap();
        let mut watcher = watcher_for(&dir);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "[logging]").unwrap();

        // File system notifications are not guaranteed in every sandbox.
        if let Ok(Some(change)) =
            tokio::time::timeout(Duration::from_secs(2), watcher.next()).await
        {
            assert_eq!(change.path.file_name(), path.file_name());
        }
    }
}
