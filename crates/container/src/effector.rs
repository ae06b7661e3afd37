//! Permission-refresh effector
//!
//! Notifies a container about a changed file by reading the file's
//! permission bits inside the container and writing them back unchanged.
//! The `chmod` is a no-op for the file but produces a change event inside
//! the container, which host-side writes through some bind mounts do not.

use crate::runtime::{ContainerRuntime, ExecOutput, RuntimeError};
use async_trait::async_trait;
use debounce::{CallKey, Callee};
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// A changed path inside a specific container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notification {
    pub container: String,
    pub path: String,
}

impl Notification {
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }

    /// Debounce key: the same path in the same container
    pub fn call_key(&self) -> CallKey {
        CallKey::new().arg(&self.container).arg(&self.path)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container, self.path)
    }
}

/// Why a single notification failed
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The runtime could not be reached or refused the request
    #[error("container runtime request failed: {0}")]
    Transport(#[from] RuntimeError),

    /// The command ran inside the container and failed
    #[error("`{command}` exited with status {exit_code}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("unexpected permission bits from stat: {0:?}")]
    UnexpectedOutput(String),
}

impl NotifyError {
    pub fn is_transport(&self) -> bool {
        matches!(self, NotifyError::Transport(_))
    }
}

/// Outcome counters for the effector
#[derive(Debug, Default)]
pub struct EffectorStats {
    notified: AtomicU64,
    transport_failures: AtomicU64,
    command_failures: AtomicU64,
}

impl EffectorStats {
    pub fn notified(&self) -> u64 {
        self.notified.load(Ordering::Relaxed)
    }

    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    /// Non-zero exits and unusable output
    pub fn command_failures(&self) -> u64 {
        self.command_failures.load(Ordering::Relaxed)
    }
}

/// Re-applies a file's own permissions inside its container
pub struct PermissionRefresher {
    runtime: Arc<dyn ContainerRuntime>,
    stats: Arc<EffectorStats>,
}

impl PermissionRefresher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            stats: Arc::new(EffectorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<EffectorStats> {
        Arc::clone(&self.stats)
    }

    /// Refresh `notification.path` inside `notification.container`
    ///
    /// No retries: the next change to the same path triggers a new attempt.
    pub async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Notifying container {} about change in {}",
            notification.container, notification.path
        );

        let stat = self
            .exec_checked(&notification.container, ["stat", "-c", "%a", &notification.path])
            .await?;
        let mode = parse_mode(&stat.stdout)?;
        let warnings = stat.stderr.trim();
        if !warnings.is_empty() {
            debug!(container = %notification.container, "stat: {}", warnings);
        }

        let chmod = self
            .exec_checked(&notification.container, ["chmod", mode, &notification.path])
            .await?;
        let chmod = chmod.combined();
        let chmod = chmod.trim();
        if !chmod.is_empty() {
            info!("{}", chmod);
        }

        Ok(())
    }

    /// Run a privileged command, turning a non-zero exit into an error
    async fn exec_checked<const N: usize>(
        &self,
        container: &str,
        argv: [&str; N],
    ) -> Result<ExecOutput, NotifyError> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let output = self.runtime.exec(container, &argv, true).await?;

        if !output.success() {
            return Err(NotifyError::NonZeroExit {
                command: argv.join(" "),
                exit_code: output.exit_code,
                output: output.combined().trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl Callee<Notification> for PermissionRefresher {
    type Error = Infallible;

    /// Failures end here: they are logged and counted, never propagated
    async fn call(&self, notification: Notification) -> Result<(), Infallible> {
        match self.notify(&notification).await {
            Ok(()) => {
                self.stats.notified.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if e.is_transport() {
                    self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.command_failures.fetch_add(1, Ordering::Relaxed);
                }
                error!(
                    container = %notification.container,
                    path = %notification.path,
                    error = %e,
                    "Failed to notify container about change"
                );
            }
        }
        Ok(())
    }
}

/// Octal permission bits as printed by `stat -c %a`
fn parse_mode(output: &str) -> Result<&str, NotifyError> {
    let mode = output.trim();
    let valid = (1..=4).contains(&mode.len()) && mode.bytes().all(|b| (b'0'..=b'7').contains(&b));
    if valid {
        Ok(mode)
    } else {
        Err(NotifyError::UnexpectedOutput(mode.to_string()))
    }
}
