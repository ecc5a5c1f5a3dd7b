//! Per-provider health tracking.
//!
//! Counts consecutive failures, gates re-visits with an exponential
//! backoff deadline, and takes a provider out of rotation once the
//! failure threshold is reached. There is no automatic reinstatement;
//! only the administrative `reset` re-enables an unavailable provider.

use crate::routing::ledger::backoff_secs;
use std::sync::Mutex;
use tracing::{info, warn};

struct HealthState {
    available: bool,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_error_ts: f64,
    restarts: u32,
}

pub struct HealthTracker {
    provider: String,
    max_failures: u32,
    base_backoff_secs: f64,
    state: Mutex<HealthState>,
}

impl HealthTracker {
    pub fn new(provider: &str, max_failures: u32, base_backoff_secs: f64) -> Self {
        HealthTracker {
            provider: provider.to_string(),
            max_failures: max_failures.max(1),
            base_backoff_secs,
            state: Mutex::new(HealthState {
                available: true,
                consecutive_failures: 0,
                last_error: None,
                last_error_ts: 0.0,
                restarts: 0,
            }),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("health lock poisoned");
        state.consecutive_failures = 0;
        state.available = true;
    }

    pub fn record_failure(&self, error: &str, now: f64) {
        let mut state = self.state.lock().expect("health lock poisoned");
        state.consecutive_failures += 1;
        state.last_error = Some(error.to_string());
        state.last_error_ts = now;
        if state.consecutive_failures >= self.max_failures && state.available {
            state.available = false;
            warn!(
                provider = %self.provider,
                failures = state.consecutive_failures,
                "Provider marked unavailable"
            );
        }
    }

    /// Immediate removal from rotation, used for auth-class failures.
    pub fn mark_unavailable(&self, error: &str, now: f64) {
        let mut state = self.state.lock().expect("health lock poisoned");
        state.consecutive_failures = state.consecutive_failures.max(self.max_failures);
        state.last_error = Some(error.to_string());
        state.last_error_ts = now;
        if state.available {
            state.available = false;
            warn!(provider = %self.provider, "Provider marked unavailable (auth)");
        }
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().expect("health lock poisoned").available
    }

    /// True while the provider is inside its backoff deadline after a
    /// failure. Distinct from availability: a provider in backoff is
    /// skipped for now but returns on its own.
    pub fn in_backoff(&self, now: f64) -> bool {
        let state = self.state.lock().expect("health lock poisoned");
        state.consecutive_failures > 0
            && (now - state.last_error_ts)
                < backoff_secs(self.base_backoff_secs, state.consecutive_failures)
    }

    /// Administrative reinstatement.
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock().expect("health lock poisoned");
        state.available = true;
        state.consecutive_failures = 0;
        state.last_error = None;
        state.restarts += 1;
        info!(provider = %self.provider, restarts = state.restarts, "Provider reset");
        true
    }

    pub fn snapshot(&self) -> (bool, u32, Option<String>) {
        let state = self.state.lock().expect("health lock poisoned");
        (
            state.available,
            state.consecutive_failures,
            state.last_error.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_failures_mark_unavailable() {
        let health = HealthTracker::new("fast-remote", 3, 1.0);
        health.record_failure("502", 10.0);
        health.record_failure("502", 11.0);
        assert!(health.is_available());
        health.record_failure("502", 12.0);
        assert!(!health.is_available());
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let health = HealthTracker::new("fast-remote", 3, 1.0);
        health.record_failure("502", 10.0);
        health.record_failure("502", 11.0);
        health.record_success();
        let (available, failures, _) = health.snapshot();
        assert!(available);
        assert_eq!(failures, 0);
    }

    #[test]
    fn backoff_window_gates_revisits() {
        let health = HealthTracker::new("fast-remote", 5, 1.0);
        health.record_failure("timeout", 100.0);
        // One failure: backoff of 1s.
        assert!(health.in_backoff(100.5));
        assert!(!health.in_backoff(101.5));
        health.record_failure("timeout", 101.5);
        // Two failures: backoff of 2s.
        assert!(health.in_backoff(103.0));
        assert!(!health.in_backoff(104.0));
    }

    #[test]
    fn unavailable_stays_until_reset() {
        let health = HealthTracker::new("fast-remote", 1, 1.0);
        health.record_failure("401", 10.0);
        assert!(!health.is_available());
        // Success alone does not reinstate an unavailable provider in the
        // router because it is never dispatched to; reset is the path back.
        assert!(health.reset());
        assert!(health.is_available());
        let (_, failures, last_error) = health.snapshot();
        assert_eq!(failures, 0);
        assert!(last_error.is_none());
    }

    #[test]
    fn auth_failure_is_immediate() {
        let health = HealthTracker::new("fast-remote", 3, 1.0);
        health.mark_unavailable("401 unauthorized", 10.0);
        assert!(!health.is_available());
    }
}
