//! Shared helpers for spawning the binary and talking to it.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// The binary under test, with a clean marker variable.
pub fn warden() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_warden"));
    command.env_remove("LISTENER_ON").env_remove("RUST_LOG");
    command
}

/// A loopback address that was free a moment ago.
pub fn free_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

/// Status code and body of a parsed HTTP/1.1 response.
pub struct Reply {
    pub status: u16,
    pub body: String,
}

fn exchange(mut stream: impl Read + Write, path: &str, header: Option<(&str, &str)>) -> Option<Reply> {
    let extra = header
        .map(|(name, value)| format!("{name}: {value}\r\n"))
        .unwrap_or_default();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n{extra}\r\n");
    stream.write_all(request.as_bytes()).ok()?;

    let mut response = String::new();
    stream.read_to_string(&mut response).ok()?;

    let (head, body) = response.split_once("\r\n\r\n")?;
    let status = head.split_whitespace().nth(1)?.parse().ok()?;
    Some(Reply {
        status,
        body: body.to_string(),
    })
}

pub fn http_get(address: &str, path: &str, header: Option<(&str, &str)>) -> Option<Reply> {
    let stream = TcpStream::connect(address).ok()?;
    stream.set_read_timeout(Some(TIMEOUT)).ok()?;
    exchange(stream, path, header)
}

pub fn unix_get(socket: &Path) -> Option<Reply> {
    let stream = UnixStream::connect(socket).ok()?;
    stream.set_read_timeout(Some(TIMEOUT)).ok()?;
    exchange(stream, "/", None)
}

/// Extract the PID from the parent's launch message.
pub fn launched_pid(stderr: &[u8]) -> Option<u32> {
    String::from_utf8_lossy(stderr)
        .lines()
        .find_map(|line| line.strip_prefix("started as a daemon with PID "))
        .and_then(|pid| pid.trim().parse().ok())
}

pub fn terminate(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

/// Whether `pid` still accepts signals from us.
pub fn is_running(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
