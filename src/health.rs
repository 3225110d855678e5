// =============================================================================
// Source health and backoff (spec §4.1)
// =============================================================================
//
// One SourceHealth per source slot, mutated only by the task that owns it
// (dispatcher-assigned REST worker, the RSS loop, or a stream supervisor).
// No lock is needed here; ownership is per-task, not shared.
// =============================================================================

use std::time::{Duration, Instant};

const MAX_BACKOFF_SEC: u64 = 300;

/// Consecutive-failure count, current backoff window, and attempt timestamps
/// for one source slot.
#[derive(Debug, Clone)]
pub struct SourceHealth {
    pub consecutive_failures: u32,
    pub backoff: Duration,
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            backoff: Duration::ZERO,
            last_attempt: None,
            last_success: None,
        }
    }
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `force`, or never attempted, or the refresh interval has elapsed.
    pub fn due(&self, interval: Duration, force: bool, now: Instant) -> bool {
        if force {
            return true;
        }
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    /// True when a failing source is still inside its backoff window.
    pub fn skipped(&self, force: bool, now: Instant) -> bool {
        if force || self.consecutive_failures == 0 {
            return false;
        }
        match self.last_attempt {
            None => false,
            Some(last) => now.saturating_duration_since(last) < self.backoff,
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.consecutive_failures = 0;
        self.backoff = Duration::ZERO;
        self.last_success = Some(now);
        self.last_attempt = Some(now);
    }

    /// Backoff doubles as 2^consecutive_failures seconds, capped at 300s.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(now);
        let secs = 2u64
            .checked_pow(self.consecutive_failures)
            .unwrap_or(MAX_BACKOFF_SEC)
            .min(MAX_BACKOFF_SEC);
        self.backoff = Duration::from_secs(secs);
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_attempted_is_always_due_and_never_skipped() {
        let h = SourceHealth::new();
        let now = Instant::now();
        assert!(h.due(Duration::from_secs(30), false, now));
        assert!(!h.skipped(false, now));
    }

    #[test]
    fn force_overrides_due_and_skipped() {
        let mut h = SourceHealth::new();
        let t0 = Instant::now();
        h.record_failure(t0);
        assert!(h.due(Duration::from_secs(3600), true, t0));
        assert!(!h.skipped(true, t0));
    }

    #[test]
    fn backoff_doubles_and_caps_at_300() {
        let mut h = SourceHealth::new();
        let expected = [2u64, 4, 8, 16, 32, 64, 128, 256, 300, 300];
        let mut t = Instant::now();
        for exp in expected {
            h.record_failure(t);
            assert_eq!(h.backoff, Duration::from_secs(exp));
            t += Duration::from_secs(1);
        }
    }

    #[test]
    fn success_clears_failure_state() {
        let mut h = SourceHealth::new();
        let t0 = Instant::now();
        h.record_failure(t0);
        h.record_failure(t0);
        assert!(h.consecutive_failures > 0);
        h.record_success(t0);
        assert_eq!(h.consecutive_failures, 0);
        assert_eq!(h.backoff, Duration::ZERO);
        assert!(!h.skipped(false, t0));
    }

    #[test]
    fn skipped_until_backoff_elapses() {
        let mut h = SourceHealth::new();
        let t0 = Instant::now();
        h.record_failure(t0);
        assert!(h.skipped(false, t0 + Duration::from_secs(1)));
        assert!(!h.skipped(false, t0 + Duration::from_secs(2)));
    }
}
