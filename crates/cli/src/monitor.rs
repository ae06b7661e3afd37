//! Container monitor
//!
//! Tracks running containers whose names match the container pattern and
//! keeps one notifier per matching bind mount. Lifecycle events from the
//! runtime start and stop notifiers as containers come and go.

use crate::notifier::ContainerNotifier;
use container::{
    ContainerInfo, ContainerRuntime, HostPathStyle, LifecycleEvent, NamePattern, Notification,
    RuntimeError,
};
use debounce::{CallKey, Dispatcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wait before re-subscribing to an ended event feed
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Which mounts to watch and how
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub container_pattern: NamePattern,
    pub host_dir_pattern: NamePattern,
    pub excludes: Vec<String>,
    pub path_style: HostPathStyle,
}

pub struct ContainerMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    dispatcher: Dispatcher<CallKey, Notification>,
    options: MonitorOptions,
    notifiers: Mutex<HashMap<String, Vec<ContainerNotifier>>>,
    resubscribe_delay: Duration,
}

impl ContainerMonitor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        dispatcher: Dispatcher<CallKey, Notification>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            runtime,
            dispatcher,
            options,
            notifiers: Mutex::new(HashMap::new()),
            resubscribe_delay: RESUBSCRIBE_DELAY,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Watch every running container matching the pattern
    ///
    /// Returns the number of notifiers started. Fails only when the runtime
    /// cannot be queried.
    pub async fn find_containers(&self) -> Result<usize, RuntimeError> {
        let mut total = 0;
        for container in self.runtime.list_running().await? {
            if !self.options.container_pattern.matches(&container.name) {
                continue;
            }
            let count = self.watch_info(&container);
            info!("Container {} has {} watched directories", container.name, count);
            total += count;
        }

        if total == 0 {
            warn!(
                "No mounts match container name pattern {} and host directory pattern {}",
                self.options.container_pattern, self.options.host_dir_pattern
            );
        }
        Ok(total)
    }

    /// (Re)create notifiers for the bind mounts of `name`
    pub async fn watch_container(&self, name: &str) -> Result<usize, RuntimeError> {
        let container = self.runtime.inspect(name).await?;
        Ok(self.watch_info(&container))
    }

    fn watch_info(&self, container: &ContainerInfo) -> usize {
        // replace, never duplicate
        self.unwatch_container(&container.name);

        let mut started = Vec::new();
        for mount in container.mounts.iter().filter(|mount| mount.is_bind()) {
            let host_dir = match self.options.path_style.to_host_path(&mount.source) {
                Some(host_dir) => host_dir,
                None => {
                    warn!(
                        "Bind of container {} was skipped since it has invalid source path {}",
                        container.name, mount.source
                    );
                    continue;
                }
            };

            if !self
                .options
                .host_dir_pattern
                .matches(&host_dir.to_string_lossy())
            {
                debug!(
                    container = %container.name,
                    host_dir = %host_dir.display(),
                    "Bind does not match host directory pattern"
                );
                continue;
            }

            if !host_dir.is_dir() {
                warn!(
                    "Bind of container {} was skipped for path {} as it's not a directory",
                    container.name, mount.source
                );
                continue;
            }

            match ContainerNotifier::start(
                &container.name,
                &host_dir,
                &mount.destination,
                &self.options.excludes,
                self.dispatcher.clone(),
            ) {
                Ok(notifier) => {
                    info!("Notifier {} created.", notifier);
                    started.push(notifier);
                }
                Err(e) => warn!(
                    container = %container.name,
                    host_dir = %host_dir.display(),
                    error = %e,
                    "Failed to watch bind mount"
                ),
            }
        }

        let count = started.len();
        if count > 0 {
            self.notifiers.lock().insert(container.name.clone(), started);
        }
        count
    }

    /// Stop all notifiers of `name`; returns how many were stopped
    pub fn unwatch_container(&self, name: &str) -> usize {
        let removed = self.notifiers.lock().remove(name);
        match removed {
            Some(mut notifiers) => {
                for notifier in &mut notifiers {
                    notifier.stop();
                    info!("Notifier {} destroyed.", notifier);
                }
                notifiers.len()
            }
            None => 0,
        }
    }

    pub fn unwatch_all(&self) {
        let names: Vec<String> = self.notifiers.lock().keys().cloned().collect();
        for name in names {
            self.unwatch_container(&name);
        }
    }

    /// Names of containers with at least one notifier
    pub fn watched_containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.notifiers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.lock().values().map(Vec::len).sum()
    }

    /// Apply one lifecycle event
    pub async fn handle_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Started(name) => {
                if !self.options.container_pattern.matches(&name) {
                    return;
                }
                match self.watch_container(&name).await {
                    Ok(count) => info!("Container {} has {} watched directories", name, count),
                    Err(RuntimeError::NotFound(_)) => {
                        debug!(container = %name, "Container gone before it could be inspected")
                    }
                    Err(e) => warn!(container = %name, error = %e, "Failed to watch container"),
                }
            }
            LifecycleEvent::Died(name) => {
                if self.options.container_pattern.matches(&name) {
                    self.unwatch_container(&name);
                }
            }
        }
    }

    /// Bring notifiers in line with the running containers
    ///
    /// Used after a gap in the event feed, when start/die events may have
    /// been missed.
    pub async fn resync(&self) -> Result<(), RuntimeError> {
        let running = self.runtime.list_running().await?;
        let running_names: HashSet<&str> = running.iter().map(|c| c.name.as_str()).collect();

        for name in self.watched_containers() {
            if !running_names.contains(name.as_str()) {
                self.unwatch_container(&name);
            }
        }

        let watched: HashSet<String> = self.watched_containers().into_iter().collect();
        for container in &running {
            if self.options.container_pattern.matches(&container.name)
                && !watched.contains(&container.name)
            {
                self.watch_info(container);
            }
        }
        Ok(())
    }

    /// Follow lifecycle events until `shutdown` resolves
    ///
    /// An ended or failed event feed is re-subscribed after a back-off.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut resubscribing = false;

        loop {
            match self.runtime.events().await {
                Ok(mut events) => {
                    if resubscribing {
                        if let Err(e) = self.resync().await {
                            warn!(error = %e, "Failed to resync containers");
                        }
                    }
                    debug!("Listening for container events");

                    loop {
                        tokio::select! {
                            _ = &mut shutdown => return,
                            event = events.recv() => match event {
                                Some(event) => self.handle_event(event).await,
                                None => break,
                            },
                        }
                    }
                    warn!("Container event feed ended; re-subscribing");
                }
                Err(e) => warn!(error = %e, "Failed to subscribe to container events"),
            }

            resubscribing = true;
            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }
    }
}

impl Drop for ContainerMonitor {
    fn drop(&mut self) {
        self.unwatch_all();
    }
}
