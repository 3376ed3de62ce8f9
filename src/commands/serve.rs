//! Serving modes. Both run a multi-threaded tokio runtime until SIGINT or
//! SIGTERM.

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use warden::config::Settings;
use warden::service;

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

/// Re-executed daemon child: serve the inherited descriptors.
pub fn child(settings: &Settings) -> Result<()> {
    let routes = service::status_routes();
    runtime()?.block_on(service::run_child(settings, routes))?;
    Ok(())
}

/// Plain foreground run: bind directly and serve without the token gate.
pub fn foreground(settings: &Settings) -> Result<()> {
    let routes = service::status_routes();
    runtime()?.block_on(service::run_foreground(settings, routes))?;
    Ok(())
}
