//! In-memory container runtime

use async_trait::async_trait;
use container::{ContainerInfo, ContainerRuntime, ExecOutput, LifecycleEvent, Mount, RuntimeError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Runtime whose containers, events and exec replies are driven by the test
///
/// `stat` replies `644`, `chmod` succeeds silently; every exec is recorded.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerInfo>>,
    feed: Mutex<Option<mpsc::Sender<LifecycleEvent>>>,
    subscriptions: AtomicUsize,
    execs: Mutex<Vec<(String, Vec<String>)>>,
    unreachable: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_container(&self, name: &str, mounts: Vec<Mount>) {
        let mut containers = self.containers.lock();
        containers.retain(|c| c.name != name);
        containers.push(ContainerInfo {
            name: name.to_string(),
            mounts,
        });
    }

    pub fn remove_container(&self, name: &str) {
        self.containers.lock().retain(|c| c.name != name);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Deliver an event to the current subscriber
    pub async fn emit(&self, event: LifecycleEvent) -> bool {
        let feed = self.feed.lock().clone();
        match feed {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// End the current event feed, as a daemon restart would
    pub fn end_feed(&self) {
        self.feed.lock().take();
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.execs.lock().clone()
    }

    fn check_reachable(&self) -> Result<(), RuntimeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Spawn {
                program: "docker".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "daemon down"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.check_reachable()?;
        Ok(self.containers.lock().clone())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        self.check_reachable()?;
        self.containers
            .lock()
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn events(&self) -> Result<mpsc::Receiver<LifecycleEvent>, RuntimeError> {
        self.check_reachable()?;
        let (tx, rx) = mpsc::channel(16);
        *self.feed.lock() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn exec(
        &self,
        container: &str,
        argv: &[String],
        _privileged: bool,
    ) -> Result<ExecOutput, RuntimeError> {
        self.check_reachable()?;
        self.execs
            .lock()
            .push((container.to_string(), argv.to_vec()));

        let output = match argv.first().map(String::as_str) {
            Some("stat") => "644\n",
            _ => "",
        };
        Ok(ExecOutput {
            exit_code: 0,
            stdout: output.to_string(),
            stderr: String::new(),
        })
    }
}

pub fn bind(source: &Path, destination: &str) -> Mount {
    Mount {
        kind: "bind".to_string(),
        source: source.to_string_lossy().into_owned(),
        destination: destination.to_string(),
    }
}

pub fn volume(destination: &str) -> Mount {
    Mount {
        kind: "volume".to_string(),
        source: "/var/lib/docker/volumes/data/_data".to_string(),
        destination: destination.to_string(),
    }
}
