//! Market snapshot store for the exit executor.
//!
//! Aggregates trade prints and top-of-book updates from the market data
//! feed into one `MarketSnapshot` per instrument: last/previous trade,
//! best bid/ask, and a bounded rolling price history used for
//! acceleration windows.

pub mod error;
pub mod market_state;
pub mod snapshot;

pub use error::{FeedError, FeedResult};
pub use market_state::MarketState;
pub use snapshot::{MarketSnapshot, PricePoint};
