use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Removes the PID file and socket path when the daemon stops.
///
/// Runs at most once, either explicitly through [`ShutdownHook::run`] or on
/// drop. Missing files are not an error.
#[derive(Debug, Default)]
pub struct ShutdownHook {
    paths: Vec<PathBuf>,
    done: AtomicBool,
}

impl ShutdownHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_on_exit(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Returns `false` if cleanup already ran.
    pub fn run(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }

        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "already gone");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cleanup failed"),
            }
        }
        true
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.run();
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn wait_for_termination() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => debug!("received SIGINT"),
        _ = terminate => debug!("received SIGTERM"),
    }
}
