//! Market state aggregation.
//!
//! One `MarketSnapshot` per instrument behind its own lock, so feed
//! ingestion for one instrument never contends with readers of another.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};
use vq_core::{MarketEvent, Symbol};

use crate::error::FeedResult;
use crate::snapshot::{MarketSnapshot, DEFAULT_MAX_HISTORY_LEN};

type StateEntry = Arc<RwLock<MarketSnapshot>>;

/// Aggregated market state manager.
pub struct MarketState {
    /// Per-instrument snapshots.
    markets: DashMap<Symbol, StateEntry>,
    /// Longest acceleration window; history older than this is evicted.
    history_window_ms: u64,
    max_history_len: usize,
}

impl MarketState {
    /// Create a store retaining `history_window_ms` of trade history.
    #[must_use]
    pub fn new(history_window_ms: u64) -> Self {
        Self::with_history_cap(history_window_ms, DEFAULT_MAX_HISTORY_LEN)
    }

    #[must_use]
    pub fn with_history_cap(history_window_ms: u64, max_history_len: usize) -> Self {
        Self {
            markets: DashMap::new(),
            history_window_ms,
            max_history_len,
        }
    }

    fn get_or_create(&self, symbol: &Symbol) -> StateEntry {
        if let Some(entry) = self.markets.get(symbol) {
            return entry.clone();
        }
        self.markets
            .entry(symbol.clone())
            .or_insert_with(|| {
                debug!(symbol = %symbol, "Tracking new instrument");
                Arc::new(RwLock::new(MarketSnapshot::with_capacity(
                    symbol.clone(),
                    self.history_window_ms,
                    self.max_history_len,
                )))
            })
            .clone()
    }

    /// Apply a feed event received at `recv_ms`.
    ///
    /// Rejected events (invalid prices, out-of-order prints) leave the
    /// snapshot untouched and are returned as errors for the caller to log.
    pub fn apply(&self, event: &MarketEvent, recv_ms: u64) -> FeedResult<()> {
        let entry = self.get_or_create(event.symbol());
        let result = entry.write().apply(event, recv_ms);
        if let Err(e) = &result {
            trace!(symbol = %event.symbol(), error = %e, "Feed event rejected");
        }
        result
    }

    /// Run `f` against the current snapshot under a read lock.
    ///
    /// `f` must not block; the lock is held for its duration.
    pub fn read<R>(&self, symbol: &Symbol, f: impl FnOnce(&MarketSnapshot) -> R) -> Option<R> {
        self.markets.get(symbol).map(|entry| {
            let guard = entry.read();
            f(&guard)
        })
    }

    /// Owned copy of the snapshot.
    pub fn snapshot(&self, symbol: &Symbol) -> Option<MarketSnapshot> {
        self.read(symbol, MarketSnapshot::clone)
    }

    /// Milliseconds since the last accepted event for `symbol`.
    pub fn age_ms(&self, symbol: &Symbol, now_ms: u64) -> Option<u64> {
        self.read(symbol, |s| s.age_ms(now_ms)).flatten()
    }

    pub fn is_ready(&self, symbol: &Symbol) -> bool {
        self.read(symbol, MarketSnapshot::is_ready).unwrap_or(false)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.markets.iter().map(|e| e.key().clone()).collect()
    }

    pub fn history_window_ms(&self) -> u64 {
        self.history_window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vq_core::{BookTicker, Price, Trade};

    fn sym() -> Symbol {
        Symbol::from("ETHUSDT")
    }

    fn trade_event(price: rust_decimal::Decimal, time_ms: u64) -> MarketEvent {
        MarketEvent::Trade(Trade {
            symbol: sym(),
            price: Price::new(price),
            time_ms,
        })
    }

    fn book_event(time_ms: u64) -> MarketEvent {
        MarketEvent::BookTicker(BookTicker {
            symbol: sym(),
            bid: Price::new(dec!(1999.9)),
            ask: Price::new(dec!(2000.1)),
            time_ms,
        })
    }

    #[test]
    fn test_unknown_symbol_has_no_snapshot() {
        let state = MarketState::new(30_000);
        assert!(state.snapshot(&sym()).is_none());
        assert!(!state.is_ready(&sym()));
        assert!(state.age_ms(&sym(), 0).is_none());
    }

    #[test]
    fn test_apply_builds_snapshot() {
        let state = MarketState::new(30_000);
        state.apply(&trade_event(dec!(2000), 1), 1).unwrap();
        state.apply(&book_event(2), 2).unwrap();
        assert!(!state.is_ready(&sym()));

        state.apply(&trade_event(dec!(2000.1), 3), 3).unwrap();
        assert!(state.is_ready(&sym()));
        assert_eq!(state.age_ms(&sym(), 10), Some(7));
        assert_eq!(state.symbols(), vec![sym()]);
    }

    #[test]
    fn test_rejected_event_keeps_state() {
        let state = MarketState::new(30_000);
        state.apply(&trade_event(dec!(2000), 10), 10).unwrap();
        assert!(state.apply(&trade_event(dec!(1), 5), 11).is_err());

        let snap = state.snapshot(&sym()).unwrap();
        assert_eq!(snap.last_trade_price, Some(Price::new(dec!(2000))));
        assert_eq!(snap.last_update_ms, Some(10));
    }

    #[test]
    fn test_read_closure() {
        let state = MarketState::new(30_000);
        state.apply(&trade_event(dec!(2000), 1), 1).unwrap();
        let len = state.read(&sym(), |s| s.history_len());
        assert_eq!(len, Some(1));
    }
}
