//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Out-of-order event for {symbol}: event {event_ms} < last {last_ms}")]
    OutOfOrder {
        symbol: String,
        event_ms: u64,
        last_ms: u64,
    },
}

pub type FeedResult<T> = Result<T, FeedError>;
