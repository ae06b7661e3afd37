//! Command-line arguments and the optional TOML config file
//!
//! Values given on the command line take precedence over the file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use container::{HostPathStyle, NamePattern};
use debounce::DebounceConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Notify Docker containers about changes in bind-mounted host directories
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "docker-volume-watcher")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pattern of container names to be notified (default: *)
    #[arg(value_name = "CONTAINER_PATTERN")]
    pub container_pattern: Option<String>,

    /// Pattern of host directories to be monitored (default: *)
    #[arg(value_name = "HOST_DIR_PATTERN")]
    pub host_dir_pattern: Option<String>,

    /// Increase output verbosity
    #[arg(short, long)]
    pub verbose: bool,

    /// Ignore changes in files/directories matching given patterns
    #[arg(short, long, value_name = "PATTERN", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Delay container notification after a change by SECONDS and ignore
    /// further changes to the same file during this period
    #[arg(long, value_name = "SECONDS")]
    pub debounce: Option<f64>,

    /// Read settings from a TOML file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up on a single docker command after SECONDS (default: 10)
    #[arg(long, value_name = "SECONDS")]
    pub exec_timeout: Option<f64>,

    /// Container runtime CLI to use, e.g. podman (default: docker)
    #[arg(long, value_name = "PROGRAM")]
    pub docker_command: Option<String>,

    /// Write logs to FILE instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

/// Settings file, every key optional
///
/// ```toml
/// container = "web*"
/// host_dir = "/home/*/projects/*"
/// exclude = ["*.log", "node_modules"]
/// debounce = 0.5
/// exec_timeout = 10
/// docker_command = "podman"
/// verbose = true
/// log_file = "/var/log/docker-volume-watcher.log"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub container: Option<String>,
    pub host_dir: Option<String>,
    pub exclude: Vec<String>,
    pub debounce: Option<f64>,
    pub exec_timeout: Option<f64>,
    pub docker_command: Option<String>,
    pub verbose: Option<bool>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub container_pattern: NamePattern,
    pub host_dir_pattern: NamePattern,
    pub exclude: Vec<String>,
    pub debounce: DebounceConfig,
    pub exec_timeout: Duration,
    /// `None` falls back to the environment, then `docker`
    pub docker_command: Option<String>,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
    pub path_style: HostPathStyle,
}

impl WatcherConfig {
    /// Load the config file named by `--config`, if any, and merge
    pub fn resolve(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let container = args
            .container_pattern
            .or(file.container)
            .unwrap_or_else(|| "*".to_string());
        let host_dir = args
            .host_dir_pattern
            .or(file.host_dir)
            .unwrap_or_else(|| "*".to_string());

        let container_pattern = NamePattern::new(&container)
            .with_context(|| format!("Invalid container pattern {:?}", container))?;
        let host_dir_pattern = NamePattern::new(&host_dir)
            .with_context(|| format!("Invalid host directory pattern {:?}", host_dir))?;

        let exclude = if args.exclude.is_empty() {
            file.exclude
        } else {
            args.exclude
        };

        let debounce_secs = args.debounce.or(file.debounce).unwrap_or(0.0);
        let debounce = DebounceConfig::from_secs_f64(debounce_secs)
            .with_context(|| format!("Invalid --debounce value {}", debounce_secs))?;

        let exec_timeout = match args.exec_timeout.or(file.exec_timeout) {
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(timeout) if !timeout.is_zero() => timeout,
                _ => bail!("Invalid --exec-timeout value {}: expected a positive number of seconds", secs),
            },
            None => container::docker::DEFAULT_TIMEOUT,
        };

        Ok(Self {
            container_pattern,
            host_dir_pattern,
            exclude,
            debounce,
            exec_timeout,
            docker_command: args.docker_command.or(file.docker_command),
            verbose: args.verbose || file.verbose.unwrap_or(false),
            log_file: args.log_file.or(file.log_file),
            path_style: HostPathStyle::default(),
        })
    }
}
