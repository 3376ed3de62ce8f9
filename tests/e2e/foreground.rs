//! Foreground mode: no re-exec, no PID file, no token gate.

use super::helpers::{free_address, http_get, terminate, wait_until, warden, TIMEOUT};
use serial_test::serial;
use std::process::Stdio;
use tempfile::TempDir;
use wait_timeout::ChildExt;

#[test]
#[serial]
fn test_foreground_serves_until_sigterm() {
    let dir = TempDir::new().unwrap();
    let address = free_address();
    let pid_file = dir.path().join("warden.pid");

    let mut child = warden()
        .args(["-l", &address, "-P", pid_file.to_str().unwrap()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    assert!(wait_until(|| http_get(&address, "/health", None).is_some()));
    let reply = http_get(&address, "/health", None).unwrap();
    assert_eq!(reply.status, 200);
    assert!(!pid_file.exists());

    terminate(child.id());
    let status = child
        .wait_timeout(TIMEOUT)
        .unwrap()
        .expect("foreground server should stop on SIGTERM");
    assert!(status.success());
}

#[test]
#[serial]
fn test_config_file_supplies_listen_address() {
    let dir = TempDir::new().unwrap();
    let address = free_address();
    let config = dir.path().join("warden.toml");
    std::fs::write(&config, format!("listen = \"{address}\"\n")).unwrap();

    let mut child = warden()
        .args(["--config", config.to_str().unwrap()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    assert!(wait_until(|| http_get(&address, "/health", None).is_some()));

    terminate(child.id());
    assert!(child.wait_timeout(TIMEOUT).unwrap().is_some());
}

#[test]
fn test_rejects_unknown_config_keys() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("warden.toml");
    std::fs::write(&config, "daemonize = true\n").unwrap();

    let output = warden()
        .args(["--config", config.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
