use super::args::child_args;
use super::credentials::{resolve_credentials, Credentials};
use super::{pid_file, LISTENER_ENV, PRIMARY_FD};
use crate::error::{DaemonError, Result};
use clap::Command as CliCommand;
use nix::unistd::setsid;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Upper bound on descriptors passed to the child.
pub const MAX_INHERITED: usize = 8;

/// Everything the re-executed child inherits: program, arguments,
/// environment and listening sockets.
///
/// Descriptors are handed down in insertion order starting at
/// [`PRIMARY_FD`], so the first one is always the primary listener.
#[derive(Debug)]
pub struct LaunchDescriptor {
    program: PathBuf,
    arg0: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    files: Vec<OwnedFd>,
    log: Option<File>,
}

impl LaunchDescriptor {
    /// Start `program` with `listener` at [`PRIMARY_FD`] and the listener
    /// marker set to `address`. The child environment starts out empty.
    pub fn new(program: impl Into<PathBuf>, listener: OwnedFd, address: &str) -> Self {
        let program = program.into();
        Self {
            arg0: program.clone().into_os_string(),
            program,
            args: Vec::new(),
            env: vec![(LISTENER_ENV.into(), address.into())],
            files: vec![listener],
            log: None,
        }
    }

    /// Re-run the current executable with its own arguments, minus the
    /// parent-only flags known to `command`.
    pub fn for_current_process(
        command: &CliCommand,
        listener: OwnedFd,
        address: &str,
    ) -> io::Result<Self> {
        let program = std::env::current_exe()?;
        let mut argv = std::env::args_os();
        let arg0 = argv
            .next()
            .unwrap_or_else(|| program.clone().into_os_string());

        Ok(Self::new(program, listener, address)
            .arg0(arg0)
            .args(child_args(command, argv)))
    }

    pub fn arg0(mut self, arg0: impl Into<OsString>) -> Self {
        self.arg0 = arg0.into();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Pass the parent's environment down as well. The listener marker
    /// keeps the value given at construction.
    pub fn inherit_environment(mut self) -> Self {
        let mut env: Vec<(OsString, OsString)> = std::env::vars_os()
            .filter(|(key, _)| key != LISTENER_ENV)
            .collect();
        env.append(&mut self.env);
        self.env = env;
        self
    }

    /// Append a descriptor; it lands at the next number after the last one.
    pub fn inherit(mut self, fd: OwnedFd) -> Self {
        self.files.push(fd);
        self
    }

    /// Send the child's stdout and stderr to `file` instead of `/dev/null`.
    pub fn log_to(mut self, file: File) -> Self {
        self.log = Some(file);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn child_args(&self) -> &[OsString] {
        &self.args
    }

    /// Value of `key` as the child will see it.
    pub fn env_value(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Descriptor numbers the child will find its sockets at, in order.
    pub fn child_descriptors(&self) -> Vec<RawFd> {
        (PRIMARY_FD..).take(self.files.len()).collect()
    }

    fn command(&self, credentials: Credentials) -> io::Result<Command> {
        let mut command = Command::new(&self.program);
        command
            .arg0(&self.arg0)
            .args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());

        match &self.log {
            Some(file) => {
                command.stdout(file.try_clone()?).stderr(file.try_clone()?);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        if let Some(gid) = credentials.gid {
            command.gid(gid);
        }
        if let Some(uid) = credentials.uid {
            command.uid(uid);
        }

        let sources: Vec<RawFd> = self.files.iter().map(AsRawFd::as_raw_fd).collect();
        // SAFETY: the hook runs between fork and exec; it performs only
        // async-signal-safe system calls and does not allocate.
        unsafe {
            command.pre_exec(move || {
                setsid()?;
                place_descriptors(&sources)
            });
        }

        Ok(command)
    }
}

/// Duplicate `sources` onto `PRIMARY_FD..` in the child.
///
/// Every source is first copied above the target range so that placing one
/// descriptor never clobbers another that has not been placed yet. The
/// copies are close-on-exec; the targets are not.
fn place_descriptors(sources: &[RawFd]) -> io::Result<()> {
    let floor = PRIMARY_FD + sources.len() as RawFd;
    let mut staged: [RawFd; MAX_INHERITED] = [-1; MAX_INHERITED];

    for (slot, &source) in staged.iter_mut().zip(sources) {
        // SAFETY: `source` is an open descriptor owned by the launch descriptor.
        let fd = unsafe { libc::fcntl(source, libc::F_DUPFD_CLOEXEC, floor) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        *slot = fd;
    }

    for (target, &fd) in (PRIMARY_FD..).zip(&staged[..sources.len()]) {
        // SAFETY: `fd` was just duplicated above and `target` is below it.
        if unsafe { libc::dup2(fd, target) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Starts the detached child and records its PID.
#[derive(Debug, Clone)]
pub struct Supervisor {
    pid_file: PathBuf,
    credentials: Credentials,
}

impl Supervisor {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            credentials: Credentials::default(),
        }
    }

    /// Resolve the identity the child runs as. Call this before binding any
    /// socket so an unknown user or group leaves nothing behind.
    pub fn with_credentials(mut self, user: Option<&str>, group: Option<&str>) -> Result<Self> {
        self.credentials = resolve_credentials(user, group)?;
        if !self.credentials.is_unchanged() {
            debug!(uid = ?self.credentials.uid, gid = ?self.credentials.gid, "resolved child credentials");
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Spawn the child described by `descriptor` and write its PID file.
    ///
    /// Nothing is retried: a second spawn would hand the same sockets to two
    /// daemons. If the PID file cannot be written the child is killed before
    /// the error is returned. The parent's copies of the descriptors are
    /// closed when this returns.
    pub fn launch(&self, descriptor: LaunchDescriptor) -> Result<u32> {
        if descriptor.files.len() > MAX_INHERITED {
            return Err(DaemonError::Config(format!(
                "cannot pass {} descriptors to the child (at most {MAX_INHERITED})",
                descriptor.files.len()
            )));
        }

        let mut command = descriptor
            .command(self.credentials)
            .map_err(DaemonError::ProcessStart)?;
        let mut child = command.spawn().map_err(DaemonError::ProcessStart)?;
        let pid = child.id();

        if let Err(source) = pid_file::write(&self.pid_file, pid) {
            if let Err(e) = child.kill() {
                warn!(pid, error = %e, "failed to kill child without a PID file");
            }
            if let Err(e) = child.wait() {
                warn!(pid, error = %e, "failed to reap child without a PID file");
            }
            if let Err(e) = pid_file::remove(&self.pid_file) {
                warn!(pid_file = %self.pid_file.display(), error = %e, "failed to remove partial PID file");
            }
            return Err(DaemonError::PidFile {
                path: self.pid_file.clone(),
                pid,
                source,
            });
        }

        info!(
            pid,
            pid_file = %self.pid_file.display(),
            descriptors = ?descriptor.child_descriptors(),
            "started daemon child"
        );
        Ok(pid)
    }
}
