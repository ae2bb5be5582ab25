//! Removal watching for the discovery file.
//!
//! The watcher observes the parent directory rather than the file itself:
//! the owning process keeps the file open for locking, and some platforms
//! only report deletion of an open file once its last handle closes.

use std::any::Any;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use notify::event::ModifyKind;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tracing::{debug, warn};

const WATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watch");

/// Callback fired at most once when the watched path disappears.
pub type RemovalCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised when a removal watch cannot be installed.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The platform watcher could not observe the path.
    #[error("cannot watch '{path}' for removal: {source}")]
    Unavailable {
        /// Path that was to be watched.
        path: PathBuf,
        /// Underlying watcher error.
        #[source]
        source: notify::Error,
    },
}

/// Live registration; dropping it stops delivery.
pub struct Subscription {
    _guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    /// Wraps a value whose drop ends the registration.
    #[must_use]
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    /// Registration with nothing to release.
    #[must_use]
    pub const fn none() -> Self {
        Self { _guard: None }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("active", &self._guard.is_some())
            .finish()
    }
}

/// Signals deletion of a filesystem path.
pub trait RemovalWatcher: Send + Sync {
    /// Calls `on_removed` once `path` is deleted or renamed away.
    fn watch(&self, path: &Path, on_removed: RemovalCallback) -> Result<Subscription, WatchError>;
}

/// Watcher backed by the platform notification API through `notify`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyRemovalWatcher;

impl RemovalWatcher for NotifyRemovalWatcher {
    fn watch(&self, path: &Path, on_removed: RemovalCallback) -> Result<Subscription, WatchError> {
        let unavailable = |source| WatchError::Unavailable {
            path: path.to_path_buf(),
            source,
        };
        let name = path
            .file_name()
            .ok_or_else(|| unavailable(notify::Error::generic("path has no file name")))?;
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let directory =
            fs::canonicalize(parent).map_err(|error| unavailable(notify::Error::io(error)))?;
        let target = directory.join(name);

        let callback = Arc::new(Mutex::new(Some(on_removed)));
        let handler_target = target.clone();
        let handler_directory = directory.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if signals_removal(&event, &handler_target, &handler_directory) {
                        fire(&callback, &handler_target);
                    }
                }
                Err(error) => warn!(
                    target: WATCH_TARGET,
                    file = %handler_target.display(),
                    error = %error,
                    "removal watcher error"
                ),
            },
            NotifyConfig::default(),
        )
        .map_err(unavailable)?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(unavailable)?;
        debug!(
            target: WATCH_TARGET,
            file = %target.display(),
            "watching discovery file for removal"
        );
        Ok(Subscription::new(watcher))
    }
}

fn signals_removal(event: &Event, target: &Path, directory: &Path) -> bool {
    let relevant = event
        .paths
        .iter()
        .any(|changed| changed == target || changed == directory);
    let removing = matches!(
        event.kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant && removing && !target.exists()
}

fn fire(callback: &Mutex<Option<RemovalCallback>>, target: &Path) {
    let pending = callback
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(on_removed) = pending {
        debug!(
            target: WATCH_TARGET,
            file = %target.display(),
            "discovery file removed"
        );
        on_removed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Watched {
        _dir: TempDir,
        path: PathBuf,
        fired: mpsc::Receiver<()>,
        _subscription: Subscription,
    }

    #[fixture]
    fn watched() -> Watched {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("server.url");
        fs::write(&path, "tcp://127.0.0.1:1").expect("seed file");
        let (sender, fired) = mpsc::channel();
        let subscription = NotifyRemovalWatcher
            .watch(
                &path,
                Box::new(move || {
                    let _ = sender.send(());
                }),
            )
            .expect("install watcher");
        Watched {
            _dir: dir,
            path,
            fired,
            _subscription: subscription,
        }
    }

    #[rstest]
    fn deleting_the_file_fires_once(watched: Watched) {
        fs::remove_file(&watched.path).expect("remove file");
        watched
            .fired
            .recv_timeout(Duration::from_secs(5))
            .expect("removal should be reported");
        assert!(watched.fired.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[rstest]
    fn sibling_changes_are_ignored(watched: Watched) {
        let sibling = watched.path.with_file_name("other.url");
        fs::write(&sibling, "x").expect("write sibling");
        fs::remove_file(&sibling).expect("remove sibling");
        fs::write(&watched.path, "tcp://127.0.0.1:2").expect("rewrite watched file");
        assert!(watched.fired.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("absent").join("server.url");
        let result = NotifyRemovalWatcher.watch(&path, Box::new(|| {}));
        assert!(matches!(result, Err(WatchError::Unavailable { .. })));
    }
}
