//! Serving options.
//!
//! Values come from command-line flags, then an optional TOML file, then
//! built-in defaults. Only serving options live in the file: whether to
//! daemonize and which user or group to run as are launch decisions taken
//! on the command line alone.
//!
//! ```toml
//! listen = "127.0.0.1:8080"
//! pid_file = "/run/warden.pid"
//! socket = "/run/warden.sock"
//! token_header = "X-Token"
//! log_level = "info"
//!
//! [tokens]
//! max_tokens = 3
//! max_uses = 10
//! timeout = "15m"
//! ```

use crate::error::{DaemonError, Result};
use crate::token::{TokenPolicy, DEFAULT_TOKEN_HEADER};
use axum::http::HeaderName;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = ":8080";

/// Contents of the optional configuration file.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub pid_file: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub token_header: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub tokens: TokensSection,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TokensSection {
    pub max_tokens: Option<usize>,
    pub max_uses: Option<usize>,
    /// Duration text, e.g. `"90s"` or `"1h30m"`.
    pub timeout: Option<String>,
}

/// Load and parse a configuration file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| DaemonError::Config(format!("unable to read {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| DaemonError::Config(format!("unable to parse {}: {e}", path.display())))
}

/// Serving options given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub listen: Option<String>,
    pub pid_file: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub max_tokens: Option<usize>,
    pub max_uses: Option<usize>,
    pub token_timeout: Option<Duration>,
    pub token_header: Option<String>,
}

/// Fully resolved serving options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub listen: String,
    pub pid_file: PathBuf,
    pub socket_path: PathBuf,
    pub tokens: TokenPolicy,
    pub token_header: String,
    pub log_level: Option<String>,
}

impl Settings {
    /// Merge `overrides` over `file` over the defaults for program `name`.
    pub fn resolve(
        overrides: SettingsOverrides,
        file: Option<FileConfig>,
        name: &str,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = TokenPolicy::default();

        let ttl = match (overrides.token_timeout, file.tokens.timeout) {
            (Some(ttl), _) => ttl,
            (None, Some(text)) => parse_duration(&text)
                .map_err(|e| DaemonError::Config(format!("tokens.timeout: {e}")))?,
            (None, None) => defaults.ttl,
        };

        let settings = Self {
            listen: overrides
                .listen
                .or(file.listen)
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            pid_file: overrides
                .pid_file
                .or(file.pid_file)
                .unwrap_or_else(|| default_pid_file(name)),
            socket_path: overrides
                .socket
                .or(file.socket)
                .unwrap_or_else(|| default_socket(name)),
            tokens: TokenPolicy {
                max_tokens: overrides
                    .max_tokens
                    .or(file.tokens.max_tokens)
                    .unwrap_or(defaults.max_tokens),
                max_uses: overrides
                    .max_uses
                    .or(file.tokens.max_uses)
                    .unwrap_or(defaults.max_uses),
                ttl,
            },
            token_header: overrides
                .token_header
                .or(file.token_header)
                .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.to_string()),
            log_level: file.log_level,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            return Err(DaemonError::Config("listen address is empty".to_string()));
        }
        if self.tokens.is_enabled() && self.socket_path.as_os_str().is_empty() {
            return Err(DaemonError::Config("socket path is empty".to_string()));
        }
        HeaderName::try_from(self.token_header.as_str()).map_err(|e| {
            DaemonError::Config(format!("invalid token header {:?}: {e}", self.token_header))
        })?;
        Ok(())
    }
}

pub fn default_pid_file(name: &str) -> PathBuf {
    PathBuf::from(format!("/run/{name}.pid"))
}

pub fn default_socket(name: &str) -> PathBuf {
    PathBuf::from(format!("/run/{name}.sock"))
}

/// Parse duration text such as `300ms`, `1.5h` or `2h45m`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// needs no unit. Negative durations are rejected.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("invalid duration {text:?}");

    let mut rest = text.trim();
    if rest.starts_with('-') {
        return Err(format!("negative duration {text:?}"));
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);

        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(format!("missing unit in duration {text:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {text:?}")),
        };

        let part = scale(number, unit_nanos).ok_or_else(invalid)?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration {text:?} is too large"))?;
        rest = tail;
    }

    Ok(total)
}

/// `number` (digits with at most one `.`) times `unit_nanos` nanoseconds.
fn scale(number: &str, unit_nanos: u128) -> Option<Duration> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;

    let mut place = unit_nanos;
    for digit in fraction.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit - b'0') * place)?;
    }

    let secs = u64::try_from(nanos / 1_000_000_000).ok()?;
    let subsec = u32::try_from(nanos % 1_000_000_000).ok()?;
    Some(Duration::new(secs, subsec))
}
