//! DockerCli against a scripted stand-in for the docker binary

#![cfg(unix)]

use container::{
    ContainerRuntime, DockerCli, LifecycleEvent, Notification, PermissionRefresher, RuntimeError,
};
use debounce::Callee;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const FAKE_DOCKER: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
case "$1" in
  ps)
    printf 'web\n'
    ;;
  inspect)
    if [ "$4" = "missing" ]; then
      echo "Error: No such container: missing" >&2
      exit 1
    fi
    echo '[{"Name":"/web","Mounts":[{"Type":"bind","Source":"/srv/site","Destination":"/var/www"},{"Type":"volume","Source":"/var/lib/docker/volumes/x/_data","Destination":"/data"}]}]'
    ;;
  exec)
    shift
    [ "$1" = "--privileged" ] && shift
    container="$1"
    shift
    case "$container" in
      gone)
        echo "Error response from daemon: No such container: gone" >&2
        exit 125
        ;;
      slow)
        sleep 5
        ;;
    esac
    case "$1" in
      stat) echo "WARNING: No swap limit support" >&2; echo 640 ;;
      chmod) ;;
      *) echo "$1: not found" >&2; exit 127 ;;
    esac
    ;;
  events)
    echo '{"Type":"container","Action":"start","Actor":{"Attributes":{"name":"web"}}}'
    echo '{"Type":"container","Action":"kill","Actor":{"Attributes":{"name":"web"}}}'
    echo '{"Type":"container","Action":"die","Actor":{"Attributes":{"name":"web"}}}'
    ;;
  *)
    exit 1
    ;;
esac
"#;

fn install_fake_docker(dir: &Path) -> PathBuf {
    let path = dir.join("docker");
    fs::write(&path, FAKE_DOCKER).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// One test: the script is written once and every scenario reuses it
#[tokio::test]
async fn test_docker_cli_against_scripted_binary() {
    let dir = TempDir::new().unwrap();
    let program = install_fake_docker(dir.path());
    let docker = DockerCli::new(program.to_string_lossy(), Duration::from_secs(5));

    // list + inspect
    let running = docker.list_running().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].name, "web");
    let binds: Vec<_> = running[0].mounts.iter().filter(|m| m.is_bind()).collect();
    assert_eq!(binds.len(), 1);
    assert_eq!(binds[0].source, "/srv/site");
    assert_eq!(binds[0].destination, "/var/www");

    let missing = docker.inspect("missing").await.unwrap_err();
    assert!(matches!(missing, RuntimeError::NotFound(name) if name == "missing"));

    // exec: command exit codes are data, daemon errors are failures
    let stat = docker
        .exec("web", &argv(&["stat", "-c", "%a", "/var/www/a"]), true)
        .await
        .unwrap();
    assert!(stat.success());
    assert_eq!(stat.stdout.trim(), "640");
    assert!(stat.stderr.contains("WARNING"));

    let unknown = docker.exec("web", &argv(&["nope"]), false).await.unwrap();
    assert_eq!(unknown.exit_code, 127);
    assert!(unknown.stderr.contains("not found"));

    let gone = docker
        .exec("gone", &argv(&["stat", "-c", "%a", "/x"]), true)
        .await
        .unwrap_err();
    assert!(matches!(gone, RuntimeError::CommandFailed { status: 125, .. }));

    // effector end to end
    let effector = PermissionRefresher::new(std::sync::Arc::new(docker.clone()));
    effector
        .call(Notification::new("web", "/var/www/index.html"))
        .await
        .unwrap();
    assert_eq!(effector.stats().notified(), 1);

    let log = calls(dir.path());
    assert!(log.contains(&"exec --privileged web stat -c %a /var/www/index.html".to_string()));
    assert!(log.contains(&"exec --privileged web chmod 640 /var/www/index.html".to_string()));

    // events: only start/die come through, then the feed ends
    let mut events = docker.events().await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(LifecycleEvent::Started("web".to_string()))
    );
    assert_eq!(
        events.recv().await,
        Some(LifecycleEvent::Died("web".to_string()))
    );
    assert_eq!(events.recv().await, None);

    // timeout
    let impatient = DockerCli::new(program.to_string_lossy(), Duration::from_millis(200));
    let err = impatient
        .exec("slow", &argv(&["stat", "-c", "%a", "/x"]), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Timeout { .. }));
}
