//! Filesystem change events

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// A change under a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    /// `from` is unknown when the backend only reports the destination
    Moved { from: Option<PathBuf>, to: PathBuf },
}

impl ChangeEvent {
    /// Path the change ended up at
    pub fn target_path(&self) -> &Path {
        match self {
            ChangeEvent::Created { path } | ChangeEvent::Modified { path } => path,
            ChangeEvent::Moved { to, .. } => to,
        }
    }

    /// Translate a raw notify event
    ///
    /// Removals, accesses and the source half of a split rename produce
    /// nothing: there is no file left to refresh.
    pub fn from_notify(event: &Event) -> Vec<ChangeEvent> {
        match event.kind {
            EventKind::Create(_) => event
                .paths
                .iter()
                .map(|path| ChangeEvent::Created { path: path.clone() })
                .collect(),

            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![ChangeEvent::Moved {
                    from: Some(from.clone()),
                    to: to.clone(),
                }],
                _ => Vec::new(),
            },

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
                .paths
                .iter()
                .map(|to| ChangeEvent::Moved {
                    from: None,
                    to: to.clone(),
                })
                .collect(),

            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),

            EventKind::Modify(_) | EventKind::Any | EventKind::Other => event
                .paths
                .iter()
                .map(|path| ChangeEvent::Modified { path: path.clone() })
                .collect(),

            EventKind::Remove(_) | EventKind::Access(_) => Vec::new(),
        }
    }
}
