//! Directory watching for container bind mounts
//!
//! This crate provides:
//! - Translation of raw notify events into `ChangeEvent`s
//! - Gitignore-style exclusion rules
//! - The adapter mapping host changes to container paths
//! - A recursive directory watcher feeding the adapter

pub mod adapter;
pub mod event;
pub mod exclude;
pub mod watch;

use std::path::PathBuf;
use thiserror::Error;

pub use adapter::ChangeAdapter;
pub use event::ChangeEvent;
pub use exclude::ExcludeRules;
pub use watch::DirectoryWatcher;

/// Errors setting up a watch
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid exclude pattern `{pattern}`: {source}")]
    InvalidExclude {
        pattern: String,
        #[source]
        source: ignore::Error,
    },

    #[error("cannot watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },
}
