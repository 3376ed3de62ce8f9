//! Self re-exec daemonization.
//!
//! The launching parent binds its sockets, then [`Supervisor::launch`]
//! re-executes the current program in a new session with those sockets at
//! fixed descriptor numbers and reduced credentials. The child recognises
//! itself through [`LISTENER_ENV`].
//!
//! ```text
//!  parent (privileged)                     child (new session, uid/gid)
//!  ───────────────────                     ───────────────────────────
//!  bind :80          ─┐
//!  bind warden.sock  ─┤ fd 3, fd 4  ───▶   LISTENER_ON=:80
//!  spawn, write pid  ─┘                    serve fd 3 (gated), fd 4 (tokens)
//!  exit 0                                  on SIGTERM: rm pid file, socket
//! ```

mod args;
mod credentials;
mod launch;
pub mod pid_file;
mod shutdown;

use std::os::fd::RawFd;

pub use args::{child_args, PARENT_ONLY_ARGS};
pub use credentials::{resolve_credentials, Credentials};
pub use launch::{LaunchDescriptor, Supervisor, MAX_INHERITED};
pub use shutdown::{wait_for_termination, ShutdownHook};

/// Set by the parent; its presence marks the already-listening child.
pub const LISTENER_ENV: &str = "LISTENER_ON";

/// Primary HTTP listener, right after stdin, stdout and stderr.
pub const PRIMARY_FD: RawFd = 3;

/// Token publisher UNIX listener, present only when tokens are enabled.
pub const PUBLISHER_FD: RawFd = 4;

/// Whether this process was started by [`Supervisor::launch`].
pub fn is_daemon_child() -> bool {
    std::env::var_os(LISTENER_ENV).is_some_and(|value| !value.is_empty())
}
