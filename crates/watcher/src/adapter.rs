//! Host change to container notification
//!
//! Maps a change under a bind-mounted host directory onto the matching path
//! inside the container and hands it to the dispatcher.

use crate::event::ChangeEvent;
use container::Notification;
use debounce::{CallKey, DispatchError, Dispatcher};
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Forwards changes under one host directory to one container
#[derive(Debug, Clone)]
pub struct ChangeAdapter {
    container: String,
    host_dir: PathBuf,
    container_dir: String,
    dispatcher: Dispatcher<CallKey, Notification>,
}

impl ChangeAdapter {
    pub fn new(
        container: impl Into<String>,
        host_dir: impl Into<PathBuf>,
        container_dir: impl Into<String>,
        dispatcher: Dispatcher<CallKey, Notification>,
    ) -> Self {
        Self {
            container: container.into(),
            host_dir: host_dir.into(),
            container_dir: container_dir.into(),
            dispatcher,
        }
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

    /// Container path for a host path, or `None` outside the host directory
    pub fn target_for(&self, host_path: &Path) -> Option<String> {
        let relative = host_path.strip_prefix(&self.host_dir).ok()?;

        let parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            return Some(self.container_dir.clone());
        }

        let relative = parts.join("/");
        if self.container_dir.ends_with('/') {
            Some(format!("{}{}", self.container_dir, relative))
        } else {
            Some(format!("{}/{}", self.container_dir, relative))
        }
    }

    /// Submit the notification for `event`
    ///
    /// Returns the submitted notification, or `None` when the event lies
    /// outside the host directory. An error means the dispatcher is gone.
    pub fn handle(&self, event: &ChangeEvent) -> Result<Option<Notification>, DispatchError> {
        let target = match self.target_for(event.target_path()) {
            Some(target) => target,
            None => {
                trace!(path = %event.target_path().display(), "Change outside watched directory");
                return Ok(None);
            }
        };

        let notification = Notification::new(&self.container, target);
        self.dispatcher
            .submit(notification.call_key(), notification.clone())?;
        Ok(Some(notification))
    }
}
