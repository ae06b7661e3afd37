//! Library side of the docker-volume-watcher binary
//!
//! Exposes configuration, the container monitor and per-mount notifiers so
//! they can be driven from integration tests without a running daemon.

pub mod config;
pub mod monitor;
pub mod notifier;

pub use config::{Args, FileConfig, WatcherConfig};
pub use monitor::{ContainerMonitor, MonitorOptions};
pub use notifier::ContainerNotifier;

/// Printed when the runtime cannot be reached at start-up
pub const DAEMON_UNREACHABLE: &str = "Failed to contact Docker daemon. Is it running?";
