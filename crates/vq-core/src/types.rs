//! Market data events delivered by the feed.
//!
//! Events are at-least-once and ordered within one instrument's stream.

use crate::market::Symbol;
use crate::Price;
use serde::{Deserialize, Serialize};

/// Public trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub price: Price,
    /// Exchange event time (Unix milliseconds).
    pub time_ms: u64,
}

/// Top-of-book update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTicker {
    pub symbol: Symbol,
    pub bid: Price,
    pub ask: Price,
    /// Exchange event time (Unix milliseconds).
    pub time_ms: u64,
}

impl BookTicker {
    /// Both sides present and not crossed.
    pub fn is_valid(&self) -> bool {
        self.bid.is_positive() && self.ask.is_positive() && self.bid <= self.ask
    }

    pub fn mid(&self) -> Price {
        Price::new((self.bid.inner() + self.ask.inner()) / rust_decimal::Decimal::TWO)
    }
}

/// Feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Trade(Trade),
    BookTicker(BookTicker),
}

impl MarketEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Trade(t) => &t.symbol,
            Self::BookTicker(b) => &b.symbol,
        }
    }

    pub fn time_ms(&self) -> u64 {
        match self {
            Self::Trade(t) => t.time_ms,
            Self::BookTicker(b) => b.time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_book_ticker_validity() {
        let mut b = BookTicker {
            symbol: Symbol::from("BTCUSDT"),
            bid: Price::new(dec!(100)),
            ask: Price::new(dec!(100.1)),
            time_ms: 1,
        };
        assert!(b.is_valid());
        assert_eq!(b.mid().inner(), dec!(100.05));

        b.bid = Price::new(dec!(101));
        assert!(!b.is_valid());
    }

    #[test]
    fn test_market_event_tagged_json() {
        let line = r#"{"type":"trade","symbol":"BTCUSDT","price":"100.5","time_ms":42}"#;
        let ev: MarketEvent = serde_json::from_str(line).unwrap();
        assert_eq!(ev.symbol().as_str(), "BTCUSDT");
        assert_eq!(ev.time_ms(), 42);
        assert!(matches!(ev, MarketEvent::Trade(t) if t.price.inner() == dec!(100.5)));
    }
}
