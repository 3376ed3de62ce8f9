use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use warden::config::{load_config, Settings};
use warden::daemon;

mod cli;
mod commands;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let name = program_name();

    match run(&cli, &name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{name}: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, name: &str) -> Result<()> {
    let file = cli
        .config
        .as_deref()
        .map(load_config)
        .transpose()
        .context("failed to load configuration")?;

    init_tracing(cli.verbose, file.as_ref().and_then(|f| f.log_level.as_deref()));

    let settings = Settings::resolve(cli.overrides(), file, name)?;

    // -d is never forwarded, so a re-executed child always takes the second branch.
    if cli.daemonize {
        commands::daemonize::execute(cli, &settings)
    } else if daemon::is_daemon_child() {
        commands::serve::child(&settings)
    } else {
        commands::serve::foreground(&settings)
    }
}

/// `RUST_LOG` wins, then `-v`, then the configured level, then `info`.
fn init_tracing(verbose: bool, configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug"
        } else {
            configured.unwrap_or("info")
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

/// Base name of `argv[0]`, used for the default PID file and socket paths.
fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
