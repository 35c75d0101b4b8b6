//! Prometheus metrics endpoint.

use crate::server::PassthruRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<PassthruRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &PassthruRelay) -> String {
    let m = relay.metrics();

    // Gauges: current state
    let sessions = relay.active_sessions();
    let relaying = relay.relaying_sessions();
    let largest_chunk = m.largest_chunk_bytes.load(Ordering::Relaxed);

    // Counters: monotonic since startup
    let uploads = m.uploads_total.load(Ordering::Relaxed);
    let downloads = m.downloads_total.load(Ordering::Relaxed);
    let ok = m.transfers_ok.load(Ordering::Relaxed);
    let failed = m.transfers_failed.load(Ordering::Relaxed);
    let timeouts = m.timeouts_total.load(Ordering::Relaxed);
    let conflicts = m.conflicts_total.load(Ordering::Relaxed);
    let not_found = m.not_found_total.load(Ordering::Relaxed);
    let bytes = m.bytes_relayed.load(Ordering::Relaxed);

    format!(
        r#"# HELP passthru_sessions_active Number of open sessions
# TYPE passthru_sessions_active gauge
passthru_sessions_active {sessions}

# HELP passthru_sessions_relaying Open sessions claimed by a downloader
# TYPE passthru_sessions_relaying gauge
passthru_sessions_relaying {relaying}

# HELP passthru_info Server information
# TYPE passthru_info gauge
passthru_info{{version="{version}"}} 1

# HELP passthru_largest_chunk_bytes Largest single chunk relayed since startup
# TYPE passthru_largest_chunk_bytes gauge
passthru_largest_chunk_bytes {largest_chunk}

# HELP passthru_uploads_total Uploads registered
# TYPE passthru_uploads_total counter
passthru_uploads_total {uploads}

# HELP passthru_downloads_total Downloads that claimed a session
# TYPE passthru_downloads_total counter
passthru_downloads_total {downloads}

# HELP passthru_transfers_total Finished sessions by outcome
# TYPE passthru_transfers_total counter
passthru_transfers_total{{result="ok"}} {ok}
passthru_transfers_total{{result="failed"}} {failed}
passthru_transfers_total{{result="timeout"}} {timeouts}
passthru_transfers_total{{result="conflict"}} {conflicts}

# HELP passthru_not_found_total Downloads for unknown or claimed keys
# TYPE passthru_not_found_total counter
passthru_not_found_total {not_found}

# HELP passthru_bytes_relayed_total Payload bytes relayed to downloaders
# TYPE passthru_bytes_relayed_total counter
passthru_bytes_relayed_total {bytes}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::RelayMetrics;

    #[test]
    fn render_includes_counters() {
        let relay = PassthruRelay::new(Config::default());
        RelayMetrics::incr(&relay.metrics().transfers_ok);
        RelayMetrics::incr(&relay.metrics().transfers_ok);
        relay.metrics().bytes_relayed.fetch_add(42, Ordering::Relaxed);

        let body = render(&relay);
        assert!(body.contains("passthru_sessions_active 0"));
        assert!(body.contains("passthru_sessions_relaying 0"));
        assert!(body.contains("passthru_transfers_total{result=\"ok\"} 2"));
        assert!(body.contains("passthru_bytes_relayed_total 42"));
    }
}
