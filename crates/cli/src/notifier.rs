//! Per-mount notifier: one watched host directory feeding one container

use container::Notification;
use debounce::{CallKey, Dispatcher};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::error;
use watcher::watch::resolve_root;
use watcher::{ChangeAdapter, DirectoryWatcher, WatchError};

pub struct ContainerNotifier {
    container: String,
    host_dir: PathBuf,
    container_dir: String,
    watcher: DirectoryWatcher,
}

impl ContainerNotifier {
    /// Start watching `host_dir` for changes to report into `container_dir`
    pub fn start(
        container: &str,
        host_dir: &Path,
        container_dir: &str,
        excludes: &[String],
        dispatcher: Dispatcher<CallKey, Notification>,
    ) -> Result<Self, WatchError> {
        let root = resolve_root(host_dir)?;
        let adapter = ChangeAdapter::new(container, root.clone(), container_dir, dispatcher);

        let watcher = DirectoryWatcher::start(&root, excludes, move |change| {
            if let Err(e) = adapter.handle(&change) {
                error!(
                    container = adapter.container(),
                    path = %change.target_path().display(),
                    error = %e,
                    "Change dropped"
                );
            }
        })?;

        Ok(Self {
            container: container.to_string(),
            host_dir: host_dir.to_path_buf(),
            container_dir: container_dir.to_string(),
            watcher,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    pub fn container_dir(&self) -> &str {
        &self.container_dir
    }

    pub fn stop(&mut self) {
        self.watcher.stop();
    }
}

impl fmt::Display for ContainerNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}:{}",
            self.host_dir.display(),
            self.container,
            self.container_dir
        )
    }
}

impl fmt::Debug for ContainerNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerNotifier")
            .field("container", &self.container)
            .field("host_dir", &self.host_dir)
            .field("container_dir", &self.container_dir)
            .field("watcher", &self.watcher)
            .finish()
    }
}
