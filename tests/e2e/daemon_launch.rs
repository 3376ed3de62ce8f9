//! Daemon mode: the parent binds, launches the child and exits.

use super::helpers::{
    free_address, http_get, is_running, launched_pid, terminate, unix_get, wait_until, warden,
};
use serial_test::serial;
use std::fs;
use std::process::Stdio;
use tempfile::TempDir;
use wait_timeout::ChildExt;

struct Launched {
    pid: u32,
    stderr: String,
}

fn launch(args: &[&str]) -> Launched {
    let mut child = warden()
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let status = child
        .wait_timeout(super::helpers::TIMEOUT)
        .unwrap()
        .expect("launching parent should exit promptly");
    let mut stderr = String::new();
    std::io::Read::read_to_string(&mut child.stderr.take().unwrap(), &mut stderr).unwrap();

    assert!(status.success(), "launch failed: {stderr}");
    let pid = launched_pid(stderr.as_bytes()).expect("launch message with PID");
    Launched { pid, stderr }
}

#[test]
#[serial]
fn test_daemon_serves_inherited_listener() {
    let dir = TempDir::new().unwrap();
    let address = free_address();
    let pid_file = dir.path().join("warden.pid");
    let log_file = dir.path().join("warden.log");

    let launched = launch(&[
        "-d",
        "-l",
        &address,
        "-T",
        "0",
        "-P",
        pid_file.to_str().unwrap(),
        "--log-file",
        log_file.to_str().unwrap(),
    ]);

    assert_eq!(
        fs::read_to_string(&pid_file).unwrap(),
        launched.pid.to_string(),
        "{}",
        launched.stderr
    );
    assert!(is_running(launched.pid));

    assert!(wait_until(|| http_get(&address, "/health", None).is_some()));
    let reply = http_get(&address, "/health", None).unwrap();
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("\"status\":\"ok\""));

    assert!(wait_until(|| fs::read_to_string(&log_file)
        .is_ok_and(|log| log.contains("serving inherited listener"))));

    terminate(launched.pid);
    assert!(wait_until(|| !pid_file.exists()), "PID file not removed");
}

#[test]
#[serial]
fn test_daemon_gates_requests_with_published_tokens() {
    let dir = TempDir::new().unwrap();
    let address = free_address();
    let pid_file = dir.path().join("warden.pid");
    let socket = dir.path().join("warden.sock");

    let launched = launch(&[
        "-d",
        "-l",
        &address,
        "-T",
        "1",
        "-P",
        pid_file.to_str().unwrap(),
        "-S",
        socket.to_str().unwrap(),
    ]);

    assert!(wait_until(|| unix_get(&socket).is_some()));
    let issued = unix_get(&socket).unwrap();
    assert_eq!(issued.status, 200);
    let token = issued.body.trim().to_string();
    assert!(!token.is_empty());

    let denied = http_get(&address, "/health", None).unwrap();
    assert_eq!(denied.status, 401);
    assert!(denied.body.contains("Unauthorized token"));

    let allowed = http_get(&address, "/health", Some(("X-Token", &token))).unwrap();
    assert_eq!(allowed.status, 200);

    terminate(launched.pid);
    assert!(wait_until(|| !pid_file.exists() && !socket.exists()));
}

#[test]
#[serial]
fn test_daemon_replaces_stale_socket() {
    let dir = TempDir::new().unwrap();
    let address = free_address();
    let pid_file = dir.path().join("warden.pid");
    let socket = dir.path().join("warden.sock");
    fs::write(&socket, "stale").unwrap();

    let launched = launch(&[
        "-d",
        "-l",
        &address,
        "-P",
        pid_file.to_str().unwrap(),
        "-S",
        socket.to_str().unwrap(),
    ]);

    assert!(wait_until(|| unix_get(&socket).is_some_and(|reply| reply.status == 200)));

    terminate(launched.pid);
    assert!(wait_until(|| !pid_file.exists()));
}

#[test]
#[serial]
fn test_unknown_group_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("warden.pid");
    let socket = dir.path().join("warden.sock");

    let output = warden()
        .args([
            "-d",
            "-g",
            "warden-no-such-group",
            "-l",
            &free_address(),
            "-P",
            pid_file.to_str().unwrap(),
            "-S",
            socket.to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("warden-no-such-group"), "{stderr}");
    assert!(launched_pid(&output.stderr).is_none());
    assert!(!pid_file.exists());
    assert!(!socket.exists());
}

#[test]
#[serial]
fn test_unwritable_pid_file_fails_launch() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("missing").join("warden.pid");

    let output = warden()
        .args([
            "-d",
            "-T",
            "0",
            "-l",
            &free_address(),
            "-P",
            pid_file.to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PID file"), "{stderr}");
    assert!(launched_pid(&output.stderr).is_none());
}

#[test]
#[serial]
fn test_address_in_use_fails_launch() {
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = held.local_addr().unwrap().to_string();
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("warden.pid");

    let output = warden()
        .args(["-d", "-T", "0", "-l", &address, "-P", pid_file.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unable to listen"));
    assert!(!pid_file.exists());
}
