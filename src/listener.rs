//! Listening sockets that survive a re-exec.
//!
//! The parent binds and hands back bare [`OwnedFd`]s so the supervisor can
//! place them at fixed descriptor numbers in the child. The child rebuilds
//! its listeners from those numbers with [`inherited_tcp`] and
//! [`inherited_unix`].

use crate::error::{DaemonError, Result};
use std::fs;
use std::io;
use std::net::TcpListener;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::Path;
use tracing::debug;

/// Accept Go-style `:port` addresses as "all IPv4 interfaces".
pub fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// Bind a TCP listener and return the descriptor backing it.
pub fn bind_tcp(address: &str) -> Result<OwnedFd> {
    let listener =
        TcpListener::bind(normalize_address(address)).map_err(|source| DaemonError::Bind {
            address: address.to_string(),
            source,
        })?;

    if let Ok(local) = listener.local_addr() {
        debug!(address = %local, "bound tcp listener");
    }

    Ok(OwnedFd::from(listener))
}

/// Bind a UNIX domain listener at `path`, replacing any stale socket.
pub fn bind_unix(path: &Path) -> Result<OwnedFd> {
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path).map_err(|source| DaemonError::Bind {
        address: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), "bound unix listener");

    Ok(OwnedFd::from(listener))
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DaemonError::StaleSocket {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Rebuild the TCP listener the parent left open at `fd`.
pub fn inherited_tcp(fd: RawFd) -> Result<TcpListener> {
    let listener = TcpListener::from(adopt(fd)?);
    listener
        .local_addr()
        .map_err(|e| DaemonError::InheritedListener {
            fd,
            reason: format!("not a TCP socket: {e}"),
        })?;
    Ok(listener)
}

/// Rebuild the UNIX listener the parent left open at `fd`.
pub fn inherited_unix(fd: RawFd) -> Result<UnixListener> {
    let listener = UnixListener::from(adopt(fd)?);
    listener
        .local_addr()
        .map_err(|e| DaemonError::InheritedListener {
            fd,
            reason: format!("not a UNIX socket: {e}"),
        })?;
    Ok(listener)
}

/// Take ownership of an inherited descriptor after checking it is open.
///
/// Callers must adopt each descriptor number at most once.
fn adopt(fd: RawFd) -> Result<OwnedFd> {
    // SAFETY: F_GETFD only inspects the descriptor table entry.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(DaemonError::InheritedListener {
            fd,
            reason: io::Error::last_os_error().to_string(),
        });
    }

    // SAFETY: the descriptor is open and, by the launch protocol, was handed
    // to this process for its exclusive use.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
