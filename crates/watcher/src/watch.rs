//! Recursive directory watcher

use crate::event::ChangeEvent;
use crate::exclude::ExcludeRules;
use crate::WatchError;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Canonical form of a directory to watch
///
/// Backends report canonical paths (e.g. `/private/var` on macOS), so the
/// root and everything derived from it must use the same form.
pub fn resolve_root(path: &Path) -> Result<PathBuf, WatchError> {
    let root = path.canonicalize().map_err(|e| WatchError::Notify {
        path: path.to_path_buf(),
        source: notify::Error::io(e),
    })?;
    if !root.is_dir() {
        return Err(WatchError::NotADirectory { path: root });
    }
    Ok(root)
}

/// Watches a directory tree and reports non-excluded changes
///
/// The handler runs on the backend's own thread, so it must not block.
pub struct DirectoryWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl DirectoryWatcher {
    pub fn start<F>(root: &Path, excludes: &[String], handler: F) -> Result<Self, WatchError>
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let root = resolve_root(root)?;
        let rules = ExcludeRules::new(&root, excludes)?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for change in ChangeEvent::from_notify(&event) {
                        if rules.is_excluded(change.target_path()) {
                            trace!(path = %change.target_path().display(), "Excluded change");
                            continue;
                        }
                        handler(change);
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            }
        })
        .map_err(|source| WatchError::Notify {
            path: root.clone(),
            source,
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: root.clone(),
                source,
            })?;

        debug!(root = %root.display(), "Watching directory");
        Ok(Self {
            root,
            watcher: Some(watcher),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching; idempotent
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                debug!(root = %self.root.display(), error = %e, "Unwatch failed");
            }
            debug!(root = %self.root.display(), "Stopped watching directory");
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish()
    }
}
