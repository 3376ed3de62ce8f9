//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use warden::config::{parse_duration, SettingsOverrides};

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Serve HTTP behind rotating access tokens, optionally as a daemon"
)]
pub struct Cli {
    /// Detach and serve from a re-executed child in a new session
    #[arg(short, long)]
    pub daemonize: bool,

    /// Address to listen on; ":port" means every interface [default: :8080]
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// User the daemon runs as (name or uid)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Group the daemon runs as (name or gid) [default: the user's primary group]
    #[arg(short, long)]
    pub group: Option<String>,

    /// PID file written for the daemon [default: /run/<name>.pid]
    #[arg(short = 'P', long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// UNIX socket that hands out tokens [default: /run/<name>.sock]
    #[arg(short = 'S', long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Concurrently valid tokens; 0 disables token checking [default: 1]
    #[arg(short = 'T', long, value_name = "N")]
    pub max_tokens: Option<usize>,

    /// Uses per token before it is rotated; 0 means unlimited [default: 0]
    #[arg(short = 'c', long, value_name = "N")]
    pub max_uses: Option<usize>,

    /// Token lifetime such as 90s or 1h30m; 0 means forever [default: 0]
    #[arg(short = 't', long, value_name = "DURATION", value_parser = parse_duration)]
    pub token_timeout: Option<Duration>,

    /// Pass this environment on to the daemon instead of an empty one
    #[arg(short = 'E', long)]
    pub preserve_env: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Request header carrying the token [default: X-Token]
    #[arg(long, value_name = "NAME")]
    pub token_header: Option<String>,

    /// File receiving the daemon's stdout and stderr [default: /dev/null]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// TOML file with serving options; flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            listen: self.listen.clone(),
            pid_file: self.pid_file.clone(),
            socket: self.socket.clone(),
            max_tokens: self.max_tokens,
            max_uses: self.max_uses,
            token_timeout: self.token_timeout,
            token_header: self.token_header.clone(),
        }
    }
}
