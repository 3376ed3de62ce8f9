//! Self-daemonizing HTTP service with rotating access tokens.
//!
//! A privileged parent binds the public listener and the token socket,
//! then re-executes itself detached and under reduced credentials (see
//! [`daemon`]). The child serves the inherited sockets (see [`service`]):
//! the public router is gated by a [`token::TokenGate`] and fresh tokens
//! are handed out over the local UNIX socket.

pub mod config;
pub mod daemon;
pub mod error;
pub mod listener;
pub mod service;
pub mod token;

pub use error::{DaemonError, Result};
