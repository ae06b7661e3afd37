//! Container runtime abstraction

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors talking to the container runtime
///
/// All of these are transport-level: the runtime could not be reached, or it
/// refused or failed the request itself.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected output from `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("container not found: {0}")]
    NotFound(String),
}

/// A mount as reported by the runtime's inspect output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mount {
    /// Mount type (`bind`, `volume`, `tmpfs`, ...)
    #[serde(rename = "Type")]
    pub kind: String,

    /// Source path as the runtime sees it
    #[serde(rename = "Source", default)]
    pub source: String,

    /// Mount point inside the container
    #[serde(rename = "Destination")]
    pub destination: String,
}

impl Mount {
    pub fn is_bind(&self) -> bool {
        self.kind == "bind"
    }
}

/// A running container and its mounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub mounts: Vec<Mount>,
}

/// Container lifecycle change, keyed by container name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started(String),
    Died(String),
}

/// Result of a command run inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Both streams, stdout first, for logs and error reports
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }
}

/// Everything the watcher needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Currently running containers
    async fn list_running(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    /// A single container by name
    async fn inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError>;

    /// Live feed of container start/stop events
    ///
    /// The receiver yields `None` once the feed ends.
    async fn events(&self) -> Result<mpsc::Receiver<LifecycleEvent>, RuntimeError>;

    /// Run `argv` inside `container`
    ///
    /// A non-zero exit of the command itself is an `Ok` with that exit code;
    /// `Err` means the command could not be run at all.
    async fn exec(
        &self,
        container: &str,
        argv: &[String],
        privileged: bool,
    ) -> Result<ExecOutput, RuntimeError>;
}
