//! Startup error taxonomy.
//!
//! Every variant is fatal to the invocation that produced it. A rejected
//! token is not an error: [`crate::token::TokenRegistry::check`] simply
//! returns `false`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    /// The listen address is malformed, in use, or needs privileges we lack.
    #[error("unable to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Stale socket at the UNIX socket path could not be removed.
    #[error("unable to remove stale socket {}: {source}", path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to lookup {kind} {name}: {reason}")]
    CredentialResolution {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("unable to start as a daemon: {0}")]
    ProcessStart(#[source] io::Error),

    /// The child was started but its PID could not be recorded. The child
    /// has already been killed when this is returned.
    #[error("unable to write PID file {} for child {pid}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// The inherited descriptor is missing or is not the expected socket.
    #[error("unable to use inherited descriptor {fd}: {reason}")]
    InheritedListener { fd: i32, reason: String },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
