//! Per-side signal throttle.
//!
//! Accepted signals on one (instrument, side) are spaced at least
//! `min_interval_ms` apart. Rejected evaluations do not reset the clock.

#[derive(Debug, Clone, Default)]
pub struct SignalThrottle {
    min_interval_ms: u64,
    last_accepted_ms: Option<u64>,
}

impl SignalThrottle {
    #[must_use]
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_accepted_ms: None,
        }
    }

    /// Accept a signal at `now_ms` if the interval has elapsed.
    pub fn try_accept(&mut self, now_ms: u64) -> bool {
        if !self.would_accept(now_ms) {
            return false;
        }
        self.last_accepted_ms = Some(now_ms);
        true
    }

    pub fn would_accept(&self, now_ms: u64) -> bool {
        match self.last_accepted_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.min_interval_ms,
            None => true,
        }
    }

    /// Apply a new interval from a settings swap; history is kept.
    pub fn set_interval(&mut self, min_interval_ms: u64) {
        self.min_interval_ms = min_interval_ms;
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_spacing() {
        let mut t = SignalThrottle::new(200);
        assert!(t.try_accept(1_000));
        assert!(!t.try_accept(1_100));
        assert!(!t.try_accept(1_199));
        assert!(t.try_accept(1_200));
        assert_eq!(t.last_accepted_ms(), Some(1_200));
    }

    #[test]
    fn test_zero_interval_always_accepts() {
        let mut t = SignalThrottle::new(0);
        assert!(t.try_accept(5));
        assert!(t.try_accept(5));
    }
}
