use crate::domain::cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only view of one provider's runtime state.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct ProviderStatusView {
    pub available: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub in_window_requests: u32,
    pub in_window_tokens: u64,
    pub seconds_until_window_reset: u64,
}

/// Most recent resource sample from the monitor.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Default)]
pub struct ResourceSnapshot {
    pub timestamp_ms: u64,
    pub rss_mb: f64,
    pub cpu_percent: f32,
    pub active_tasks: usize,
}

/// Aggregate status answered by the core on demand.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct StatusReport {
    pub providers: BTreeMap<String, ProviderStatusView>,
    pub cache: CacheStats,
    pub resources: ResourceSnapshot,
}
