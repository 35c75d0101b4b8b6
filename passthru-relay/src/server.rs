//! Main PassthruRelay state shared by all request handlers.
//!
//! PassthruRelay owns the session registry, the operational metrics and the
//! configuration. Handlers only ever reach each other through sessions.

use crate::config::Config;
use crate::registry::SessionRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Upload requests accepted into the registry.
    pub uploads_total: AtomicU64,
    /// Download requests that claimed a session.
    pub downloads_total: AtomicU64,
    /// Sessions that finished with `ok`.
    pub transfers_ok: AtomicU64,
    /// Sessions that finished with `failed`.
    pub transfers_failed: AtomicU64,
    /// Uploads that gave up waiting for a peer.
    pub timeouts_total: AtomicU64,
    /// Uploads rejected because the key was taken.
    pub conflicts_total: AtomicU64,
    /// Downloads for unknown or already claimed keys.
    pub not_found_total: AtomicU64,
    /// Payload bytes handed to download responses.
    pub bytes_relayed: AtomicU64,
    /// Largest single chunk ever relayed, in bytes.
    pub largest_chunk_bytes: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay server state.
#[derive(Debug)]
pub struct PassthruRelay {
    config: Config,
    registry: SessionRegistry,
    metrics: Arc<RelayMetrics>,
    wait_timeout: Duration,
}

impl PassthruRelay {
    /// Create a relay with the given configuration.
    pub fn new(config: Config) -> Self {
        let wait_timeout = config.session.wait_timeout();
        Self {
            config,
            registry: SessionRegistry::new(),
            metrics: Arc::new(RelayMetrics::default()),
            wait_timeout,
        }
    }

    /// Override the peer wait bound (sub-second bounds for tests).
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get a clone of the metrics Arc for response streams.
    pub fn metrics_arc(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// How long an uploader waits for its peer.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Number of open sessions.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Number of open sessions whose payload is being relayed.
    pub fn relaying_sessions(&self) -> usize {
        self.registry.claimed()
    }
}
