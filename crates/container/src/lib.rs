//! Container runtime integration
//!
//! This crate provides:
//! - The `ContainerRuntime` trait (list, inspect, lifecycle events, exec)
//! - A docker CLI backend
//! - Bind-mount source translation to host paths
//! - Shell-glob patterns for container names and host directories
//! - The permission-refresh effector that notifies a container about a change

pub mod docker;
pub mod effector;
pub mod path;
pub mod pattern;
pub mod runtime;

// Re-exports
pub use docker::DockerCli;
pub use effector::{EffectorStats, Notification, NotifyError, PermissionRefresher};
pub use path::HostPathStyle;
pub use pattern::NamePattern;
pub use runtime::{
    ContainerInfo, ContainerRuntime, ExecOutput, LifecycleEvent, Mount, RuntimeError,
};
