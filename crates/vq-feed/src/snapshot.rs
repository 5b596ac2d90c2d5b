//! Per-instrument market snapshot.
//!
//! Holds the latest trade price, the previous one, best bid/ask (and the
//! values they replaced), plus a time-ordered price history bounded to
//! the longest configured acceleration window.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::Serialize;
use vq_core::{BookTicker, MarketEvent, Price, Symbol, Trade};

use crate::error::{FeedError, FeedResult};

/// Default cap on retained history points per instrument.
pub const DEFAULT_MAX_HISTORY_LEN: usize = 8192;

/// One trade price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    /// Event time (Unix milliseconds).
    pub time_ms: u64,
    pub price: Price,
}

/// Latest market view of one instrument.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    /// Most recent trade price.
    pub last_trade_price: Option<Price>,
    /// Trade price before `last_trade_price`.
    pub prev_trade_price: Option<Price>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// Best bid before the latest book update.
    pub prev_best_bid: Option<Price>,
    /// Best ask before the latest book update.
    pub prev_best_ask: Option<Price>,
    /// Event time of the latest trade.
    pub last_trade_ms: Option<u64>,
    /// Event time of the latest book update.
    pub last_book_ms: Option<u64>,
    /// Local receive time of the latest accepted event; drives staleness.
    pub last_update_ms: Option<u64>,
    price_history: VecDeque<PricePoint>,
    history_window_ms: u64,
    max_history_len: usize,
}

impl MarketSnapshot {
    #[must_use]
    pub fn new(symbol: Symbol, history_window_ms: u64) -> Self {
        Self::with_capacity(symbol, history_window_ms, DEFAULT_MAX_HISTORY_LEN)
    }

    #[must_use]
    pub fn with_capacity(symbol: Symbol, history_window_ms: u64, max_history_len: usize) -> Self {
        Self {
            symbol,
            last_trade_price: None,
            prev_trade_price: None,
            best_bid: None,
            best_ask: None,
            prev_best_bid: None,
            prev_best_ask: None,
            last_trade_ms: None,
            last_book_ms: None,
            last_update_ms: None,
            price_history: VecDeque::new(),
            history_window_ms,
            max_history_len: max_history_len.max(2),
        }
    }

    // ========================================================================
    // Updates
    // ========================================================================

    pub fn apply(&mut self, event: &MarketEvent, recv_ms: u64) -> FeedResult<()> {
        match event {
            MarketEvent::Trade(t) => self.apply_trade(t, recv_ms),
            MarketEvent::BookTicker(b) => self.apply_book(b, recv_ms),
        }
    }

    /// Record a trade print. Prints older than the newest history point are
    /// rejected so the history stays time-ordered.
    pub fn apply_trade(&mut self, trade: &Trade, recv_ms: u64) -> FeedResult<()> {
        if !trade.price.is_positive() {
            return Err(FeedError::InvalidData(format!(
                "{}: non-positive trade price {}",
                trade.symbol, trade.price
            )));
        }
        if let Some(last_ms) = self.last_trade_ms {
            if trade.time_ms < last_ms {
                return Err(FeedError::OutOfOrder {
                    symbol: trade.symbol.to_string(),
                    event_ms: trade.time_ms,
                    last_ms,
                });
            }
        }

        self.prev_trade_price = self.last_trade_price;
        self.last_trade_price = Some(trade.price);
        self.last_trade_ms = Some(trade.time_ms);
        self.last_update_ms = Some(recv_ms);

        self.price_history.push_back(PricePoint {
            time_ms: trade.time_ms,
            price: trade.price,
        });
        self.evict(trade.time_ms);
        Ok(())
    }

    /// Record a top-of-book update.
    pub fn apply_book(&mut self, book: &BookTicker, recv_ms: u64) -> FeedResult<()> {
        if !book.is_valid() {
            return Err(FeedError::InvalidData(format!(
                "{}: invalid book bid={} ask={}",
                book.symbol, book.bid, book.ask
            )));
        }
        if let Some(last_ms) = self.last_book_ms {
            if book.time_ms < last_ms {
                return Err(FeedError::OutOfOrder {
                    symbol: book.symbol.to_string(),
                    event_ms: book.time_ms,
                    last_ms,
                });
            }
        }

        self.prev_best_bid = self.best_bid;
        self.prev_best_ask = self.best_ask;
        self.best_bid = Some(book.bid);
        self.best_ask = Some(book.ask);
        self.last_book_ms = Some(book.time_ms);
        self.last_update_ms = Some(recv_ms);
        Ok(())
    }

    fn evict(&mut self, newest_ms: u64) {
        let cutoff = newest_ms.saturating_sub(self.history_window_ms);
        while let Some(front) = self.price_history.front() {
            if front.time_ms < cutoff {
                self.price_history.pop_front();
            } else {
                break;
            }
        }
        while self.price_history.len() > self.max_history_len {
            self.price_history.pop_front();
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Book, last trade and previous trade all present and positive.
    pub fn is_ready(&self) -> bool {
        let positive = |p: Option<Price>| p.is_some_and(|p| p.is_positive());
        positive(self.best_bid)
            && positive(self.best_ask)
            && positive(self.last_trade_price)
            && positive(self.prev_trade_price)
    }

    /// Milliseconds since the last accepted event. `None` before any event.
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_update_ms.map(|t| now_ms.saturating_sub(t))
    }

    /// A snapshot with no data is always stale.
    pub fn is_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        self.age_ms(now_ms).map_or(true, |age| age > threshold_ms)
    }

    pub fn history(&self) -> impl Iterator<Item = &PricePoint> + '_ {
        self.price_history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.price_history.len()
    }

    pub fn newest_point(&self) -> Option<PricePoint> {
        self.price_history.back().copied()
    }

    /// Oldest point inside `[newest - window_ms, newest]`.
    pub fn oldest_in_window(&self, window_ms: u64) -> Option<PricePoint> {
        let newest = self.price_history.back()?;
        let cutoff = newest.time_ms.saturating_sub(window_ms);
        self.price_history
            .iter()
            .find(|p| p.time_ms >= cutoff)
            .copied()
    }

    /// Return over the window: `newest / oldest_in_window - 1`.
    ///
    /// `None` with fewer than two history points.
    pub fn window_return(&self, window_ms: u64) -> Option<Decimal> {
        if self.price_history.len() < 2 {
            return None;
        }
        let newest = self.newest_point()?;
        let oldest = self.oldest_in_window(window_ms)?;
        if !oldest.price.is_positive() {
            return None;
        }
        Some(newest.price.inner() / oldest.price.inner() - Decimal::ONE)
    }

    /// Reference price for notional checks: last trade, else mid.
    pub fn reference_price(&self) -> Option<Price> {
        self.last_trade_price.or_else(|| match (self.best_bid, self.best_ask) {
            (Some(b), Some(a)) => Some(Price::new((b.inner() + a.inner()) / Decimal::TWO)),
            _ => None,
        })
    }
}
