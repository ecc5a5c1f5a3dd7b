use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Request-level counters for the core. The in-flight gauge is shared
/// with the resource monitor.
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_succeeded: AtomicU64,
    pub requests_failed: AtomicU64,
    pub tokens_processed: AtomicU64,
    pub current_active_requests: Arc<AtomicU64>,
    pub retries_total: AtomicU64,
    pub failovers_total: AtomicU64,
    pub streams_total: AtomicU64,
    pub parallel_executions_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            requests_total: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            tokens_processed: AtomicU64::new(0),
            current_active_requests: Arc::new(AtomicU64::new(0)),
            retries_total: AtomicU64::new(0),
            failovers_total: AtomicU64::new(0),
            streams_total: AtomicU64::new(0),
            parallel_executions_total: AtomicU64::new(0),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}
