//! Top-level modes of the binary.

pub mod daemonize;
pub mod serve;
