//! Daemonize: bind as the invoking user, then hand the sockets to a
//! detached child running as the requested user and group.

use anyhow::{Context, Result};
use clap::CommandFactory;
use std::fs::OpenOptions;
use warden::config::Settings;
use warden::daemon::{LaunchDescriptor, Supervisor};
use warden::listener;

use crate::cli::Cli;

pub fn execute(cli: &Cli, settings: &Settings) -> Result<()> {
    // Resolve credentials first so a bad user or group leaves no socket behind.
    let supervisor = Supervisor::new(&settings.pid_file)
        .with_credentials(cli.user.as_deref(), cli.group.as_deref())?;

    let primary = listener::bind_tcp(&settings.listen)?;

    let mut descriptor =
        LaunchDescriptor::for_current_process(&Cli::command(), primary, &settings.listen)
            .context("unable to locate the current executable")?;

    if cli.preserve_env {
        descriptor = descriptor.inherit_environment();
    }

    if settings.tokens.is_enabled() {
        descriptor = descriptor.inherit(listener::bind_unix(&settings.socket_path)?);
    }

    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("unable to open log file {}", path.display()))?;
        descriptor = descriptor.log_to(file);
    }

    let pid = supervisor.launch(descriptor)?;
    eprintln!("started as a daemon with PID {pid}");
    Ok(())
}
