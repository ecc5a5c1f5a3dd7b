//! Per-provider rate-limit ledger.
//!
//! Windows are hopping, not sliding: once the window length has elapsed
//! since `window_start`, both counters reset and the window start moves
//! to now on the next call. Mutations are serialised per provider; the
//! lock is never held across a suspension point.

use std::sync::Mutex;

const MAX_BACKOFF_SECS: f64 = 60.0;

/// Exponential backoff used by both the health tracker and the router's
/// in-place retry loop, capped at 60 seconds.
pub fn backoff_secs(base_secs: f64, failures: u32) -> f64 {
    if failures == 0 {
        return 0.0;
    }
    let exponent = (failures - 1).min(31);
    (base_secs * f64::from(1u32 << exponent)).min(MAX_BACKOFF_SECS)
}

struct Window {
    requests: u32,
    tokens: u64,
    window_start: f64,
}

pub struct RateLimitLedger {
    max_requests: u32,
    max_tokens: u64,
    window_secs: f64,
    window: Mutex<Window>,
}

impl RateLimitLedger {
    pub fn new(max_requests: u32, max_tokens: u64, window_secs: u64) -> Self {
        RateLimitLedger {
            max_requests,
            max_tokens,
            window_secs: window_secs as f64,
            window: Mutex::new(Window {
                requests: 0,
                tokens: 0,
                window_start: 0.0,
            }),
        }
    }

    /// True iff, after a lazy window reset, both counters plus the
    /// estimate stay within quota. `max_requests == 0` refuses always.
    pub fn can_admit(&self, estimated_tokens: u64, now: f64) -> bool {
        let mut window = self.window.lock().expect("ledger lock poisoned");
        self.maybe_reset(&mut window, now);
        window.requests < self.max_requests
            && window.tokens + estimated_tokens < self.max_tokens
    }

    /// Advance the counters for one admitted request.
    pub fn record(&self, tokens: u64, now: f64) {
        let mut window = self.window.lock().expect("ledger lock poisoned");
        self.maybe_reset(&mut window, now);
        window.requests += 1;
        window.tokens += tokens;
    }

    /// Saturate the request counter for the remainder of the window,
    /// used when the endpoint itself reports rate exhaustion.
    pub fn saturate(&self, now: f64) {
        let mut window = self.window.lock().expect("ledger lock poisoned");
        self.maybe_reset(&mut window, now);
        window.requests = self.max_requests;
    }

    pub fn time_until_reset(&self, now: f64) -> f64 {
        let window = self.window.lock().expect("ledger lock poisoned");
        (self.window_secs - (now - window.window_start)).max(0.0)
    }

    /// (in-window requests, in-window tokens) after a lazy reset check.
    pub fn snapshot(&self, now: f64) -> (u32, u64) {
        let mut window = self.window.lock().expect("ledger lock poisoned");
        self.maybe_reset(&mut window, now);
        (window.requests, window.tokens)
    }

    fn maybe_reset(&self, window: &mut Window, now: f64) {
        if now - window.window_start > self.window_secs {
            window.requests = 0;
            window.tokens = 0;
            window.window_start = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_request_quota() {
        let ledger = RateLimitLedger::new(2, 1_000_000, 60);
        assert!(ledger.can_admit(100, 10.0));
        ledger.record(100, 10.0);
        assert!(ledger.can_admit(100, 11.0));
        ledger.record(100, 11.0);
        assert!(!ledger.can_admit(100, 12.0));
    }

    #[test]
    fn token_quota_counts_the_estimate() {
        let ledger = RateLimitLedger::new(100, 1000, 60);
        ledger.record(900, 10.0);
        assert!(!ledger.can_admit(100, 11.0));
        assert!(ledger.can_admit(50, 11.0));
    }

    #[test]
    fn window_hop_resets_both_counters() {
        let ledger = RateLimitLedger::new(1, 1000, 60);
        ledger.record(500, 10.0);
        assert!(!ledger.can_admit(1, 20.0));
        // Window started at 10.0; 71.0 is past the hop point.
        assert!(ledger.can_admit(1, 71.0));
        let (requests, tokens) = ledger.snapshot(71.0);
        assert_eq!((requests, tokens), (0, 0));
    }

    #[test]
    fn zero_request_quota_always_refuses() {
        let ledger = RateLimitLedger::new(0, 1000, 60);
        assert!(!ledger.can_admit(0, 0.0));
        assert!(!ledger.can_admit(0, 1000.0));
    }

    #[test]
    fn saturate_blocks_the_rest_of_the_window() {
        let ledger = RateLimitLedger::new(10, 1_000_000, 60);
        ledger.record(10, 10.0);
        ledger.saturate(11.0);
        assert!(!ledger.can_admit(1, 12.0));
        assert!(ledger.can_admit(1, 72.0));
    }

    #[test]
    fn time_until_reset_counts_down() {
        let ledger = RateLimitLedger::new(10, 1000, 60);
        ledger.record(1, 100.0);
        assert_eq!(ledger.time_until_reset(130.0), 30.0);
        assert_eq!(ledger.time_until_reset(500.0), 0.0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(1.0, 0), 0.0);
        assert_eq!(backoff_secs(1.0, 1), 1.0);
        assert_eq!(backoff_secs(1.0, 2), 2.0);
        assert_eq!(backoff_secs(1.0, 3), 4.0);
        assert_eq!(backoff_secs(1.0, 10), 60.0);
    }
}
