//! Serving loops for the daemon child and for foreground mode.

use crate::config::Settings;
use crate::daemon::{wait_for_termination, ShutdownHook, PRIMARY_FD, PUBLISHER_FD};
use crate::error::{DaemonError, Result};
use crate::listener;
use crate::token::{publisher_router, TokenGate};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::io;
use std::net::TcpListener as StdTcpListener;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

type ServerTask = JoinHandle<Result<()>>;

/// Routes every deployment exposes.
pub fn status_routes() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Put `router` behind `gate`. Without a gate the router is returned as is.
pub fn gated(router: Router, gate: Option<TokenGate>) -> Router {
    match gate {
        Some(gate) => gate.protect(router),
        None => router,
    }
}

/// Serve `routes` on the descriptors inherited from the launching parent.
///
/// The primary listener at [`PRIMARY_FD`] is always adopted. When token
/// issuance is enabled the publisher at [`PUBLISHER_FD`] is adopted too and
/// `routes` are gated. Returns after a termination signal once both servers
/// have drained and the PID file and socket path are removed.
pub async fn run_child(settings: &Settings, routes: Router) -> Result<()> {
    let primary = async_tcp(listener::inherited_tcp(PRIMARY_FD)?, PRIMARY_FD)?;

    let mut hook = ShutdownHook::new();
    hook.remove_on_exit(&settings.pid_file);

    let registry = settings.tokens.registry().map(Arc::new);
    let publisher = match &registry {
        Some(registry) => {
            hook.remove_on_exit(&settings.socket_path);
            let unix = async_unix(listener::inherited_unix(PUBLISHER_FD)?, PUBLISHER_FD)?;
            Some((unix, Arc::clone(registry)))
        }
        None => None,
    };

    let gate = registry
        .map(|registry| TokenGate::new(registry, &settings.token_header))
        .transpose()?;
    let app = gated(routes, gate);

    let (stop, stopped) = watch::channel(false);

    if let Ok(address) = primary.local_addr() {
        info!(address = %address, tokens = settings.tokens.is_enabled(), "serving inherited listener");
    }
    let public = tokio::spawn(serve_tcp(primary, app, stopped.clone()));

    let publisher = publisher.map(|(unix, registry)| {
        info!(path = %settings.socket_path.display(), "publishing tokens");
        tokio::spawn(serve_unix(unix, publisher_router(registry, "/"), stopped))
    });

    let outcome = supervise(public, publisher, stop, wait_for_termination()).await;
    hook.run();
    outcome
}

/// Wait for `shutdown` or for either server to stop, then drain both.
///
/// A publisher that stops on its own is an error: the daemon would keep
/// serving with no way to mint tokens.
async fn supervise<F>(
    mut public: ServerTask,
    mut publisher: Option<ServerTask>,
    stop: watch::Sender<bool>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let outcome = tokio::select! {
        _ = shutdown => {
            info!("shutting down");
            let _ = stop.send(true);
            joined(public.await)
        }
        result = &mut public => {
            let _ = stop.send(true);
            joined(result)
        }
        result = publisher_exit(&mut publisher) => {
            publisher = None;
            error!("token publisher stopped, shutting down");
            let _ = stop.send(true);
            if let Err(e) = joined(public.await) {
                error!(error = %e, "server failed while draining");
            }
            Err(result.err().unwrap_or_else(|| {
                DaemonError::Serve(io::Error::other("token publisher stopped"))
            }))
        }
    };

    if let Some(handle) = publisher {
        if let Err(e) = joined(handle.await) {
            error!(error = %e, "token publisher failed");
        }
    }

    outcome
}

async fn publisher_exit(publisher: &mut Option<ServerTask>) -> Result<()> {
    match publisher {
        Some(handle) => joined(handle.await),
        None => std::future::pending().await,
    }
}

/// Bind `settings.listen` and serve `routes` ungated until a termination
/// signal. No PID file is written and no tokens are issued.
pub async fn run_foreground(settings: &Settings, routes: Router) -> Result<()> {
    let listener = bound_listener(&settings.listen)?;

    if let Ok(address) = listener.local_addr() {
        info!(address = %address, "serving in foreground");
    }

    axum::serve(listener, routes)
        .with_graceful_shutdown(wait_for_termination())
        .await
        .map_err(DaemonError::Serve)
}

/// Bind `address` and register the listener with the runtime.
fn bound_listener(address: &str) -> Result<TcpListener> {
    let listener = StdTcpListener::from(listener::bind_tcp(address)?);
    listener
        .set_nonblocking(true)
        .and_then(|()| TcpListener::from_std(listener))
        .map_err(DaemonError::Serve)
}

async fn serve_tcp(listener: TcpListener, app: Router, stopped: watch::Receiver<bool>) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_requested(stopped))
        .await
        .map_err(DaemonError::Serve)
}

async fn serve_unix(
    listener: UnixListener,
    app: Router,
    stopped: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_requested(stopped))
        .await
        .map_err(DaemonError::Serve)
}

async fn stop_requested(mut stopped: watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
    debug!("draining connections");
}

fn joined(result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    result.map_err(|e| DaemonError::Serve(io::Error::other(e)))?
}

fn async_tcp(listener: StdTcpListener, fd: i32) -> Result<TcpListener> {
    listener
        .set_nonblocking(true)
        .and_then(|()| TcpListener::from_std(listener))
        .map_err(|e| DaemonError::InheritedListener {
            fd,
            reason: e.to_string(),
        })
}

fn async_unix(listener: StdUnixListener, fd: i32) -> Result<UnixListener> {
    listener
        .set_nonblocking(true)
        .and_then(|()| UnixListener::from_std(listener))
        .map_err(|e| DaemonError::InheritedListener {
            fd,
            reason: e.to_string(),
        })
}
