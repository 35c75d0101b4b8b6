//! HTTP endpoints for passthru-relay.
//!
//! Provides the transfer endpoints, the index page, health checks and metrics.

pub mod health;
mod metrics;
pub mod pages;
pub mod transfer;

use crate::server::PassthruRelay;
use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub use health::HealthStatus;

/// Header carrying the original client address behind a proxy.
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<PassthruRelay>) -> Router {
    let mut router = Router::new()
        .route("/", get(pages::index_handler))
        .route("/upload/:key", post(transfer::upload_handler))
        .route("/download/:key", get(transfer::download_handler))
        .route("/health", get(health::health_handler));

    if relay.config().server.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// Client address for log lines.
///
/// Uses the first `X-Forwarded-For` entry when the relay is configured to
/// trust it, otherwise the socket peer address.
pub(crate) fn client_addr(
    relay: &PassthruRelay,
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> String {
    if relay.config().server.trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }

    connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
