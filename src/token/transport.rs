//! HTTP adapters over a shared [`TokenRegistry`].

use super::TokenRegistry;
use crate::error::{DaemonError, Result};
use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOKEN_HEADER: &str = "X-Token";

/// Inbound filter: requests without a live token never reach the router.
#[derive(Clone)]
pub struct TokenGate {
    registry: Arc<TokenRegistry>,
    header: HeaderName,
}

impl TokenGate {
    pub fn new(registry: Arc<TokenRegistry>, header: &str) -> Result<Self> {
        let header = HeaderName::try_from(header)
            .map_err(|e| DaemonError::Config(format!("invalid token header {header:?}: {e}")))?;
        Ok(Self { registry, header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Mount the gate ahead of every route already registered on `router`.
    pub fn protect<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, require_token))
    }
}

pub async fn require_token(State(gate): State<TokenGate>, request: Request, next: Next) -> Response {
    let allowed = {
        let presented = request
            .headers()
            .get(&gate.header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        gate.registry.check(presented)
    };

    if allowed {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "rejected request without a valid token");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized token" })),
        )
            .into_response()
    }
}

/// Router answering `GET path` with one freshly issued token as plain text.
///
/// Serve this only on the local UNIX socket.
pub fn publisher_router(registry: Arc<TokenRegistry>, path: &str) -> Router {
    Router::new()
        .route(path, get(issue_token))
        .with_state(registry)
}

async fn issue_token(State(registry): State<Arc<TokenRegistry>>) -> String {
    registry.get()
}
