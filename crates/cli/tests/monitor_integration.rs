//! Container monitor against an in-memory runtime and real directories

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use cli_lib::{ContainerMonitor, MonitorOptions};
use common::{bind, eventually, volume, FakeRuntime};
use container::{HostPathStyle, LifecycleEvent, NamePattern, Notification, PermissionRefresher};
use debounce::{Callee, DebounceConfig, Dispatcher, DispatcherHandle, ShutdownMode};
use std::convert::Infallible;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

const PATIENCE: Duration = Duration::from_secs(5);

struct Discard;

#[async_trait]
impl Callee<Notification> for Discard {
    type Error = Infallible;

    async fn call(&self, _: Notification) -> Result<(), Infallible> {
        Ok(())
    }
}

fn options(container_pattern: &str, host_dir_pattern: &str) -> MonitorOptions {
    MonitorOptions {
        container_pattern: NamePattern::new(container_pattern).unwrap(),
        host_dir_pattern: NamePattern::new(host_dir_pattern).unwrap(),
        excludes: Vec::new(),
        path_style: HostPathStyle::Native,
    }
}

fn monitor(runtime: &Arc<FakeRuntime>, options: MonitorOptions) -> (ContainerMonitor, DispatcherHandle) {
    let (dispatcher, handle) = Dispatcher::spawn(DebounceConfig::default(), Discard);
    (ContainerMonitor::new(runtime.clone(), dispatcher, options), handle)
}

#[tokio::test]
async fn test_find_containers_watches_matching_bind_mounts() {
    let temp_dir = TempDir::new().unwrap();
    let site = temp_dir.path().join("site");
    let file = temp_dir.path().join("notes.txt");
    fs::create_dir_all(&site).unwrap();
    fs::write(&file, b"x").unwrap();

    let runtime = FakeRuntime::new();
    runtime.add_container(
        "web_1",
        vec![
            bind(&site, "/var/www"),
            volume("/data"),
            bind(&temp_dir.path().join("missing"), "/missing"),
            bind(&file, "/notes.txt"),
        ],
    );
    runtime.add_container("db", vec![bind(&site, "/srv")]);

    let (monitor, _handle) = monitor(&runtime, options("web_*", "*"));
    let started = monitor.find_containers().await.unwrap();

    assert_eq!(started, 1);
    assert_eq!(monitor.watched_containers(), vec!["web_1"]);
    assert_eq!(monitor.notifier_count(), 1);
}

#[tokio::test]
async fn test_host_directory_pattern_filters_mounts() {
    let temp_dir = TempDir::new().unwrap();
    let site = temp_dir.path().join("site");
    let logs = temp_dir.path().join("logs");
    fs::create_dir_all(&site).unwrap();
    fs::create_dir_all(&logs).unwrap();

    let runtime = FakeRuntime::new();
    runtime.add_container("web", vec![bind(&site, "/var/www"), bind(&logs, "/var/log")]);

    let (monitor, _handle) = monitor(&runtime, options("*", "*/site"));
    assert_eq!(monitor.find_containers().await.unwrap(), 1);
}

#[tokio::test]
async fn test_nothing_matching_is_not_an_error() {
    let runtime = FakeRuntime::new();
    let (monitor, _handle) = monitor(&runtime, options("web*", "*"));
    assert_eq!(monitor.find_containers().await.unwrap(), 0);
    assert!(monitor.watched_containers().is_empty());
}

#[tokio::test]
async fn test_unreachable_runtime_fails_find() {
    let runtime = FakeRuntime::new();
    runtime.set_unreachable(true);
    let (monitor, _handle) = monitor(&runtime, options("*", "*"));
    assert!(monitor.find_containers().await.is_err());
}

#[tokio::test]
async fn test_rewatch_replaces_notifiers() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    runtime.add_container("web", vec![bind(temp_dir.path(), "/var/www")]);

    let (monitor, _handle) = monitor(&runtime, options("*", "*"));
    assert_eq!(monitor.watch_container("web").await.unwrap(), 1);
    assert_eq!(monitor.watch_container("web").await.unwrap(), 1);
    assert_eq!(monitor.notifier_count(), 1);

    assert_eq!(monitor.unwatch_container("web"), 1);
    assert_eq!(monitor.unwatch_container("web"), 0);
    assert_eq!(monitor.notifier_count(), 0);
}

#[tokio::test]
async fn test_lifecycle_events_start_and_stop_notifiers() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    runtime.add_container("api", vec![bind(temp_dir.path(), "/app")]);
    runtime.add_container("other", vec![bind(temp_dir.path(), "/app")]);

    let (monitor, _handle) = monitor(&runtime, options("api*", "*"));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        assert!(eventually(PATIENCE, || runtime.subscriptions() == 1).await);

        assert!(runtime.emit(LifecycleEvent::Started("api".to_string())).await);
        assert!(eventually(PATIENCE, || monitor.watched_containers() == vec!["api"]).await);

        // not matching the container pattern
        assert!(runtime.emit(LifecycleEvent::Started("other".to_string())).await);
        // vanished before it could be inspected
        assert!(runtime.emit(LifecycleEvent::Started("api_gone".to_string())).await);

        assert!(runtime.emit(LifecycleEvent::Died("api".to_string())).await);
        assert!(eventually(PATIENCE, || monitor.watched_containers().is_empty()).await);

        stop_tx.send(()).unwrap();
    };

    tokio::join!(
        monitor.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );
    assert_eq!(monitor.notifier_count(), 0);
}

#[tokio::test]
async fn test_ended_feed_is_resubscribed_and_resynced() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    runtime.add_container("web", vec![bind(temp_dir.path(), "/var/www")]);

    let (monitor, _handle) = monitor(&runtime, options("*", "*"));
    let monitor = monitor.with_resubscribe_delay(Duration::from_millis(10));
    monitor.find_containers().await.unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let driver = async {
        assert!(eventually(PATIENCE, || runtime.subscriptions() == 1).await);

        // changes while the feed is down
        runtime.remove_container("web");
        runtime.add_container("late", vec![bind(temp_dir.path(), "/srv")]);
        runtime.end_feed();

        assert!(eventually(PATIENCE, || runtime.subscriptions() == 2).await);
        assert!(eventually(PATIENCE, || monitor.watched_containers() == vec!["late"]).await);

        stop_tx.send(()).unwrap();
    };

    tokio::join!(
        monitor.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_change_refreshes_permissions_in_container() {
    let temp_dir = TempDir::new().unwrap();
    let site = temp_dir.path().join("site");
    fs::create_dir_all(site.join("css")).unwrap();

    let runtime = FakeRuntime::new();
    runtime.add_container("web", vec![bind(&site, "/var/www/html")]);

    let effector = PermissionRefresher::new(runtime.clone());
    let stats = effector.stats();
    let (dispatcher, handle) =
        Dispatcher::spawn(DebounceConfig::new(Duration::from_millis(50)), effector);

    let monitor = ContainerMonitor::new(
        runtime.clone(),
        dispatcher,
        MonitorOptions {
            excludes: vec!["*.swp".to_string()],
            ..options("*", "*")
        },
    );
    assert_eq!(monitor.find_containers().await.unwrap(), 1);

    fs::write(site.join("css/.app.css.swp"), b"swap").unwrap();
    fs::write(site.join("css/app.css"), b"body {}").unwrap();

    let chmod = vec![
        "chmod".to_string(),
        "644".to_string(),
        "/var/www/html/css/app.css".to_string(),
    ];
    let delivered = eventually(PATIENCE, || {
        runtime
            .execs()
            .iter()
            .any(|(container, argv)| container == "web" && *argv == chmod)
    })
    .await;
    assert!(delivered, "no chmod for app.css: {:?}", runtime.execs());
    assert!(runtime
        .execs()
        .iter()
        .all(|(_, argv)| !argv.iter().any(|arg| arg.ends_with(".swp"))));

    monitor.unwatch_all();
    drop(monitor);
    handle.shutdown(ShutdownMode::Abandon).await.unwrap();
    assert!(stats.notified() >= 1);
    assert_eq!(stats.transport_failures(), 0);
}
