//! Task classification, provider bookkeeping and the router.

pub mod classifier;
pub mod health;
pub mod ledger;
pub mod router;

use crate::cache::epoch_secs;
use crate::clients::ProviderAdapter;
use crate::core::config::{ProviderConfig, RouterConfig};
use crate::routing::health::HealthTracker;
use crate::routing::ledger::RateLimitLedger;
use aide_types::prelude::ProviderStatusView;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use router::Router;

/// Runtime state for one configured provider. Mutated only by the router
/// under the per-provider locks inside the ledger and the tracker;
/// observers get read-only views.
pub struct ProviderState {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub ledger: RateLimitLedger,
    pub health: HealthTracker,
    total_requests: AtomicU64,
    total_tokens: AtomicU64,
}

impl ProviderState {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        provider_config: &ProviderConfig,
        router_config: &RouterConfig,
    ) -> Self {
        ProviderState {
            ledger: RateLimitLedger::new(
                provider_config.max_requests_per_window,
                provider_config.max_tokens_per_window,
                provider_config.window_secs,
            ),
            health: HealthTracker::new(
                &provider_config.name,
                router_config.max_failures,
                router_config.base_backoff_ms as f64 / 1000.0,
            ),
            adapter,
            total_requests: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        }
    }

    pub fn record_totals(&self, tokens: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn status_view(&self) -> ProviderStatusView {
        let now = epoch_secs();
        let (available, consecutive_failures, last_error) = self.health.snapshot();
        let (in_window_requests, in_window_tokens) = self.ledger.snapshot(now);
        ProviderStatusView {
            available,
            consecutive_failures,
            last_error,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            in_window_requests,
            in_window_tokens,
            seconds_until_window_reset: self.ledger.time_until_reset(now) as u64,
        }
    }
}
