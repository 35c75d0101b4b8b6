//! Health check endpoint.
//!
//! Reports liveness plus a breakdown of open sessions: uploads still waiting
//! for a downloader, and uploads whose payload is being relayed.

use crate::server::PassthruRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the process start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

fn uptime_seconds() -> u64 {
    START_TIME.get().map_or(0, |start| start.elapsed().as_secs())
}

/// Open sessions by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    /// Uploads registered with no downloader yet.
    pub waiting: usize,
    /// Uploads a downloader has claimed.
    pub relaying: usize,
}

impl SessionCounts {
    /// Snapshot the relay's registry.
    ///
    /// The two numbers are read one after the other, so a session changing
    /// phase in between may be counted in either.
    pub fn of(relay: &PassthruRelay) -> Self {
        let total = relay.active_sessions();
        let relaying = relay.relaying_sessions().min(total);
        Self {
            waiting: total - relaying,
            relaying,
        }
    }
}

/// `/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
    /// Open sessions by phase.
    pub sessions: SessionCounts,
    /// How long an uploader waits for its peer, in seconds.
    pub wait_timeout_secs: u64,
    /// Seconds since startup.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    fn of(relay: &PassthruRelay) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            sessions: SessionCounts::of(relay),
            wait_timeout_secs: relay.wait_timeout().as_secs(),
            uptime_seconds: uptime_seconds(),
        }
    }
}

/// Health check handler.
pub async fn health_handler(
    Extension(relay): Extension<Arc<PassthruRelay>>,
) -> Json<HealthStatus> {
    Json(HealthStatus::of(&relay))
}
