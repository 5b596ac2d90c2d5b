//! Order-related types and identifiers.
//!
//! Provides position side, order side, type, time-in-force, and client
//! order ID types. In hedge mode each instrument carries two independent
//! positions (LONG and SHORT) that are closed separately.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Hedge-mode position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub const BOTH: [PositionSide; 2] = [PositionSide::Long, PositionSide::Short];

    /// Order side that reduces this position.
    pub fn closing_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }

    /// Single-letter code used in client order IDs.
    pub fn code(&self) -> char {
        match self {
            Self::Long => 'L',
            Self::Short => 'S',
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Limit order.
    Limit,
    /// Market order.
    Market,
    /// Exchange-side stop triggered by mark price.
    StopMarket,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
            Self::StopMarket => write!(f, "STOP_MARKET"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    /// Good-til-crossing: post-only, rejected instead of taking liquidity.
    #[serde(rename = "GTX")]
    PostOnly,
}

impl TimeInForce {
    pub fn is_post_only(&self) -> bool {
        matches!(self, Self::PostOnly)
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "GTC"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
            Self::PostOnly => write!(f, "GTX"),
        }
    }
}

/// Client order ID for idempotency.
///
/// A timed-out placement is retried with the same ID so the exchange
/// deduplicates it instead of resting two orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Maximum length accepted by the exchange.
    pub const MAX_LEN: usize = 36;

    /// Create a new unique client order ID.
    ///
    /// Format: `vq-{side}-{timestamp_ms}-{uuid_short}`
    pub fn new(side: PositionSide) -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("vq-{}-{ts}-{uuid_short}", side.code()))
    }

    /// Create an ID with a caller-chosen prefix (e.g. protective stops).
    pub fn with_prefix(prefix: &str) -> Self {
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        let mut id = format!("{prefix}-{uuid_short}");
        id.truncate(Self::MAX_LEN);
        Self(id)
    }

    /// Create from an existing string (for parsing responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_closing_side() {
        assert_eq!(PositionSide::Long.closing_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.closing_side(), OrderSide::Buy);
    }

    #[test]
    fn test_client_order_id_unique() {
        let id1 = ClientOrderId::new(PositionSide::Long);
        let id2 = ClientOrderId::new(PositionSide::Long);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_client_order_id_format() {
        let id = ClientOrderId::new(PositionSide::Short);
        assert!(id.as_str().starts_with("vq-S-"));
        assert!(id.as_str().len() <= ClientOrderId::MAX_LEN);
    }

    #[test]
    fn test_client_order_id_prefix_truncated() {
        let id = ClientOrderId::with_prefix("vq-ps-VERYLONGSYMBOLNAMEUSDT-L-123456");
        assert!(id.as_str().len() <= ClientOrderId::MAX_LEN);
    }

    #[test]
    fn test_time_in_force_serde() {
        let json = serde_json::to_string(&TimeInForce::PostOnly).unwrap();
        assert_eq!(json, "\"GTX\"");
    }
}
