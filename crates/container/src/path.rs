//! Bind-mount source translation
//!
//! The runtime reports bind sources as the daemon sees them. On Docker
//! Desktop for Windows that is a path inside the VM (`/host_mnt/c/...` or
//! `/run/desktop/mnt/host/c/...`), which has to be mapped back to a drive
//! path before it can be watched on the host.

use std::path::PathBuf;

const VM_PREFIXES: [&str; 2] = ["/host_mnt/", "/run/desktop/mnt/host/"];

/// How bind sources map to host paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPathStyle {
    /// Sources are already host paths (Linux, macOS)
    Native,
    /// Sources use Docker Desktop's VM form and map to `X:\...`
    Windows,
}

impl Default for HostPathStyle {
    fn default() -> Self {
        if cfg!(windows) {
            HostPathStyle::Windows
        } else {
            HostPathStyle::Native
        }
    }
}

impl HostPathStyle {
    /// Host directory for a bind source, or `None` if it cannot be mapped
    pub fn to_host_path(self, source: &str) -> Option<PathBuf> {
        match self {
            HostPathStyle::Native => {
                if source.starts_with('/') {
                    Some(PathBuf::from(source))
                } else {
                    None
                }
            }
            HostPathStyle::Windows => windows_drive_path(source).map(PathBuf::from),
        }
    }
}

/// `[/host_mnt/]C[:]/rest` or `[/run/desktop/mnt/host/]c\rest` -> `C:\rest`
///
/// The remainder is kept as-is; only the drive part is rewritten.
pub fn windows_drive_path(source: &str) -> Option<String> {
    let stripped = VM_PREFIXES
        .iter()
        .find_map(|prefix| source.strip_prefix(prefix))
        .unwrap_or(source);

    let mut chars = stripped.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    let mut rest = chars.as_str();

    if let Some(after_colon) = rest.strip_prefix(':') {
        rest = after_colon;
    }
    let rest = rest
        .strip_prefix('/')
        .or_else(|| rest.strip_prefix('\\'))?;

    Some(format!("{}:\\{}", drive, rest))
}
