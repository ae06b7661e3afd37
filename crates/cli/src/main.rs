//! docker-volume-watcher - notify containers about host-side file changes

use anyhow::{Context, Result};
use clap::Parser;
use cli_lib::{Args, ContainerMonitor, MonitorOptions, WatcherConfig, DAEMON_UNREACHABLE};
use container::{DockerCli, PermissionRefresher};
use debounce::{Dispatcher, ShutdownMode};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WatcherConfig::resolve(Args::parse())?;
    let _log_guard = init_logging(&config)?;

    let runtime = Arc::new(match &config.docker_command {
        Some(program) => DockerCli::new(program.as_str(), config.exec_timeout),
        None => DockerCli::from_env(config.exec_timeout),
    });

    let effector = PermissionRefresher::new(runtime.clone());
    let effector_stats = effector.stats();
    let (dispatcher, dispatcher_handle) = Dispatcher::spawn(config.debounce, effector);

    let monitor = ContainerMonitor::new(
        runtime,
        dispatcher,
        MonitorOptions {
            container_pattern: config.container_pattern.clone(),
            host_dir_pattern: config.host_dir_pattern.clone(),
            excludes: config.exclude.clone(),
            path_style: config.path_style,
        },
    );

    if let Err(e) = monitor.find_containers().await {
        error!(error = %e, "{}", DAEMON_UNREACHABLE);
        drop(monitor);
        let _ = dispatcher_handle.shutdown(ShutdownMode::Abandon).await;
        return Err(e).context(DAEMON_UNREACHABLE);
    }

    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    info!("Got interrupt. Exiting...");

    monitor.unwatch_all();
    drop(monitor);

    let stats = dispatcher_handle
        .shutdown(ShutdownMode::Abandon)
        .await
        .context("Dispatcher did not shut down cleanly")?;
    info!(
        submitted = stats.submitted,
        invoked = stats.invoked,
        suppressed = stats.suppressed,
        superseded = stats.superseded,
        failed = stats.failed,
        notified = effector_stats.notified(),
        transport_failures = effector_stats.transport_failures(),
        command_failures = effector_stats.command_failures(),
        "Dispatcher stopped"
    );

    Ok(())
}

/// INFO with `-v`, WARN otherwise; to `--log-file` when given
fn init_logging(config: &WatcherConfig) -> Result<Option<WorkerGuard>> {
    let level = if config.verbose { Level::INFO } else { Level::WARN };

    let Some(path) = &config.log_file else {
        tracing_subscriber::fmt().with_max_level(level).init();
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path {} has no file name", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}
