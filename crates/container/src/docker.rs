//! Docker CLI backend
//!
//! Talks to the runtime by running the `docker` binary (or a compatible one
//! such as `podman`) and parsing its JSON output.

use crate::runtime::{
    ContainerInfo, ContainerRuntime, ExecOutput, LifecycleEvent, Mount, RuntimeError,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Program used when nothing else is configured
pub const DEFAULT_PROGRAM: &str = "docker";

/// Environment variable overriding the runtime program
pub const PROGRAM_ENV: &str = "DOCKER_VOLUME_WATCHER_DOCKER_CMD";

/// Default bound on a single runtime command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `docker exec` status for errors of the daemon itself
const DAEMON_ERROR_STATUS: i32 = 125;

const EVENT_BUFFER: usize = 64;

/// [`ContainerRuntime`] backed by the docker command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Use `$DOCKER_VOLUME_WATCHER_DOCKER_CMD`, falling back to `docker`
    pub fn from_env(timeout: Duration) -> Self {
        let program = std::env::var(PROGRAM_ENV).unwrap_or_else(|_| DEFAULT_PROGRAM.into());
        Self::new(program, timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    /// Run the program to completion, bounded by the configured timeout
    async fn run(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        trace!(command = %self.describe(args), "Running runtime command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Err(_) => Err(RuntimeError::Timeout {
                command: self.describe(args),
                timeout: self.timeout,
            }),
            Ok(Err(source)) => Err(RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            }),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Run and require a zero exit status; returns stdout
    async fn run_checked(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: self.describe(args),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn inspect_many(&self, names: &[&str]) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let mut args = vec!["inspect", "--type", "container"];
        args.extend_from_slice(names);

        let stdout = self.run_checked(&args).await?;
        parse_inspect(&stdout).map_err(|source| RuntimeError::Parse {
            command: self.describe(&args),
            source,
        })
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let stdout = self.run_checked(&["ps", "--format", "{{.Names}}"]).await?;
        let names: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.inspect_many(&names).await
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        match self.inspect_many(&[name]).await {
            Ok(mut containers) if !containers.is_empty() => Ok(containers.swap_remove(0)),
            Ok(_) => Err(RuntimeError::NotFound(name.to_string())),
            Err(RuntimeError::CommandFailed { stderr, .. }) if is_no_such_container(&stderr) => {
                Err(RuntimeError::NotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn events(&self) -> Result<mpsc::Receiver<LifecycleEvent>, RuntimeError> {
        let args = [
            "events",
            "--format",
            "{{json .}}",
            "--filter",
            "type=container",
            "--filter",
            "event=start",
            "--filter",
            "event=die",
        ];

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::Spawn {
            program: self.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"),
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(event) = parse_event_line(&line) {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(None) => {
                            debug!("Runtime event stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read runtime event stream");
                            break;
                        }
                    },
                }
            }
            let _ = child.kill().await;
        });

        Ok(rx)
    }

    async fn exec(
        &self,
        container: &str,
        argv: &[String],
        privileged: bool,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec"];
        if privileged {
            args.push("--privileged");
        }
        args.push(container);
        args.extend(argv.iter().map(String::as_str));

        let output = self.run(&args).await?;
        let status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // 125: the daemon refused (container gone, not running, ...); -1: killed
        if status == DAEMON_ERROR_STATUS || status < 0 {
            return Err(RuntimeError::CommandFailed {
                command: self.describe(&args),
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ExecOutput {
            exit_code: status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: stderr.into_owned(),
        })
    }
}

fn is_no_such_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("no such container")
}

#[derive(Deserialize)]
struct InspectEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Mounts", default)]
    mounts: Option<Vec<Mount>>,
}

/// Parse `docker inspect` output (a JSON array)
pub fn parse_inspect(json: &str) -> Result<Vec<ContainerInfo>, serde_json::Error> {
    let entries: Vec<InspectEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| ContainerInfo {
            name: entry.name.trim_start_matches('/').to_string(),
            mounts: entry.mounts.unwrap_or_default(),
        })
        .collect())
}

#[derive(Deserialize)]
struct EventLine {
    #[serde(rename = "Type")]
    kind: Option<String>,
    // Older daemons only send `status`, newer ones `Action` as well
    status: Option<String>,
    #[serde(rename = "Action")]
    action: Option<String>,
    #[serde(rename = "Actor", default)]
    actor: EventActor,
}

#[derive(Deserialize, Default)]
struct EventActor {
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// Parse one line of `docker events --format '{{json .}}'`
///
/// Returns `None` for lines that are not container start/die events.
pub fn parse_event_line(line: &str) -> Option<LifecycleEvent> {
    let event: EventLine = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, line, "Skipping unparsable runtime event");
            return None;
        }
    };

    if event.kind.as_deref().map_or(false, |kind| kind != "container") {
        return None;
    }

    let name = event.actor.attributes.get("name")?.clone();
    match event.action.as_deref().or(event.status.as_deref())? {
        "start" => Some(LifecycleEvent::Started(name)),
        "die" => Some(LifecycleEvent::Died(name)),
        _ => None,
    }
}
