//! Shared outbound rate budget.
//!
//! Sliding one-second windows for placements and cancels, shared by every
//! controller trading under the same credential. Check-and-record happens
//! under one lock so two controllers placing in the same tick cannot both
//! take the last slot.
//!
//! Cancels are served first: while any cancel is waiting for budget, new
//! placements are denied unless the caller is forced (liquidation), and
//! even then only if the placement window itself has room.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Rate budget configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Placements per window; 0 disables the limit.
    #[serde(default = "default_max_orders_per_sec")]
    pub max_orders_per_sec: u32,
    /// Cancels per window; 0 disables the limit.
    #[serde(default = "default_max_cancels_per_sec")]
    pub max_cancels_per_sec: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_orders_per_sec() -> u32 {
    10
}

fn default_max_cancels_per_sec() -> u32 {
    15
}

fn default_window_ms() -> u64 {
    1_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_orders_per_sec: default_max_orders_per_sec(),
            max_cancels_per_sec: default_max_cancels_per_sec(),
            window_ms: default_window_ms(),
        }
    }
}

/// Why a placement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDenied {
    /// Placement window full.
    WindowExhausted,
    /// Cancels are waiting for budget.
    CancelPriority,
}

impl RateDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WindowExhausted => "rate_limited",
            Self::CancelPriority => "cancel_priority",
        }
    }
}

impl fmt::Display for RateDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sliding window of event timestamps.
#[derive(Debug)]
struct Window {
    max_events: u32,
    events_ms: VecDeque<u64>,
}

impl Window {
    fn new(max_events: u32) -> Self {
        Self {
            max_events,
            events_ms: VecDeque::with_capacity(max_events as usize),
        }
    }

    /// Drop events at or before `now - window`.
    fn prune(&mut self, now_ms: u64, window_ms: u64) {
        let Some(cutoff) = now_ms.checked_sub(window_ms) else {
            return;
        };
        while self.events_ms.front().is_some_and(|&t| t <= cutoff) {
            self.events_ms.pop_front();
        }
    }

    fn has_room(&self) -> bool {
        self.max_events == 0 || self.events_ms.len() < self.max_events as usize
    }

    fn record(&mut self, now_ms: u64) {
        if self.max_events > 0 {
            self.events_ms.push_back(now_ms);
        }
    }
}

#[derive(Debug)]
struct Inner {
    window_ms: u64,
    orders: Window,
    cancels: Window,
    /// Order IDs whose cancel was refused and must go out first.
    deferred_cancels: HashSet<String>,
}

impl Inner {
    fn prune(&mut self, now_ms: u64) {
        self.orders.prune(now_ms, self.window_ms);
        self.cancels.prune(now_ms, self.window_ms);
    }
}

/// Per-credential placement/cancel budget.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<Inner>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                window_ms: config.window_ms.max(1),
                orders: Window::new(config.max_orders_per_sec),
                cancels: Window::new(config.max_cancels_per_sec),
                deferred_cancels: HashSet::new(),
            }),
        }
    }

    /// Whether a placement would currently be admitted (no side effects).
    pub fn check_place(&self, now_ms: u64, force: bool) -> Result<(), RateDenied> {
        let mut inner = self.inner.lock();
        inner.prune(now_ms);
        Self::admit_place(&inner, force)
    }

    fn admit_place(inner: &Inner, force: bool) -> Result<(), RateDenied> {
        if !inner.orders.has_room() {
            return Err(RateDenied::WindowExhausted);
        }
        if !force && !inner.deferred_cancels.is_empty() {
            return Err(RateDenied::CancelPriority);
        }
        Ok(())
    }

    /// Atomically check and take one placement slot.
    pub fn try_acquire_place(&self, now_ms: u64, force: bool) -> Result<(), RateDenied> {
        let mut inner = self.inner.lock();
        inner.prune(now_ms);
        let admitted = Self::admit_place(&inner, force);
        match admitted {
            Ok(()) => {
                inner.orders.record(now_ms);
                if !inner.orders.has_room() {
                    debug!(
                        count = inner.orders.events_ms.len(),
                        max = inner.orders.max_events,
                        "Placement budget exhausted for this window"
                    );
                }
            }
            Err(reason) => {
                debug!(%reason, force, "Placement denied by rate budget");
            }
        }
        admitted
    }

    /// Atomically check and take one cancel slot for `order_id`.
    ///
    /// A refused cancel is queued as deferred; placements yield to it until
    /// it is granted or [`Self::clear_deferred`] drops it.
    pub fn try_acquire_cancel(&self, now_ms: u64, order_id: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.prune(now_ms);
        if inner.cancels.has_room() {
            inner.cancels.record(now_ms);
            inner.deferred_cancels.remove(order_id);
            true
        } else {
            if inner.deferred_cancels.insert(order_id.to_string()) {
                warn!(
                    order_id,
                    backlog = inner.deferred_cancels.len(),
                    "Cancel deferred by rate budget"
                );
            }
            false
        }
    }

    /// Drop a deferred cancel whose order is no longer live.
    pub fn clear_deferred(&self, order_id: &str) {
        self.inner.lock().deferred_cancels.remove(order_id);
    }

    pub fn deferred_cancels(&self) -> usize {
        self.inner.lock().deferred_cancels.len()
    }

    pub fn place_count(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        inner.prune(now_ms);
        inner.orders.events_ms.len()
    }

    pub fn cancel_count(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        inner.prune(now_ms);
        inner.cancels.events_ms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn limiter(orders: u32, cancels: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_orders_per_sec: orders,
            max_cancels_per_sec: cancels,
            window_ms: 1_000,
        })
    }

    #[test]
    fn test_order_window() {
        let l = limiter(2, 10);
        assert!(l.try_acquire_place(0, false).is_ok());
        assert!(l.try_acquire_place(100, false).is_ok());
        assert_eq!(
            l.try_acquire_place(200, false),
            Err(RateDenied::WindowExhausted)
        );
        // event at 0 leaves the window at 1000
        assert!(l.try_acquire_place(1_001, false).is_ok());
    }

    #[test]
    fn test_cancel_window() {
        let l = limiter(10, 1);
        assert!(l.try_acquire_cancel(0, "a"));
        assert!(!l.try_acquire_cancel(1, "b"));
        assert!(l.try_acquire_cancel(1_001, "b"));
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let l = limiter(0, 0);
        for t in 0..100 {
            assert!(l.try_acquire_place(t, false).is_ok());
            assert!(l.try_acquire_cancel(t, "x"));
        }
        assert_eq!(l.place_count(100), 0);
    }

    #[test]
    fn test_deferred_cancel_blocks_unforced_placement() {
        let l = limiter(10, 1);
        assert!(l.try_acquire_cancel(0, "a"));
        assert!(!l.try_acquire_cancel(10, "b"));
        assert_eq!(l.deferred_cancels(), 1);

        assert_eq!(
            l.try_acquire_place(20, false),
            Err(RateDenied::CancelPriority)
        );
        // liquidation-forced placement skips the queue
        assert!(l.try_acquire_place(20, true).is_ok());

        // granted cancel clears the backlog
        assert!(l.try_acquire_cancel(1_001, "b"));
        assert_eq!(l.deferred_cancels(), 0);
        assert!(l.try_acquire_place(1_002, false).is_ok());
    }

    #[test]
    fn test_force_does_not_bypass_window() {
        let l = limiter(1, 10);
        assert!(l.try_acquire_place(0, true).is_ok());
        assert_eq!(
            l.try_acquire_place(1, true),
            Err(RateDenied::WindowExhausted)
        );
    }

    #[test]
    fn test_clear_deferred() {
        let l = limiter(10, 1);
        assert!(l.try_acquire_cancel(0, "a"));
        assert!(!l.try_acquire_cancel(1, "b"));
        l.clear_deferred("b");
        assert!(l.check_place(2, false).is_ok());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_budget() {
        let l = Arc::new(limiter(5, 5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = Arc::clone(&l);
                thread::spawn(move || l.try_acquire_place(500, false).is_ok())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 5);
    }
}
