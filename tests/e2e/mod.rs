//! End-to-end tests that run the real binary.

mod daemon_launch;
mod foreground;
mod helpers;
