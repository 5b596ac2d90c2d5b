//! Execution-related types for the per-side order lifecycle.
//!
//! This module provides types for:
//! - Controller identity (instrument + position side)
//! - Lifecycle states and execution modes
//! - The single outstanding order a controller may own
//! - Order events routed back from the exchange

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::Symbol;
use crate::order::{ClientOrderId, OrderSide, PositionSide};
use crate::{Price, Size};

// ============================================================================
// Identity
// ============================================================================

/// Key of one Execution Controller: exactly one per (instrument, side).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerKey {
    pub symbol: Symbol,
    pub side: PositionSide,
}

impl ControllerKey {
    #[must_use]
    pub fn new(symbol: Symbol, side: PositionSide) -> Self {
        Self { symbol, side }
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.side)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Order style used for the next placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Post-only at or behind the touch.
    #[default]
    MakerOnly,
    /// Limit order offset into the spread; may cross.
    AggressiveLimit,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MakerOnly => "maker_only",
            Self::AggressiveLimit => "aggressive_limit",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a Position Side Context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    #[default]
    Idle,
    Place,
    Wait,
    Cancel,
    Cooldown,
    Done,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Place => "PLACE",
            Self::Wait => "WAIT",
            Self::Cancel => "CANCEL",
            Self::Cooldown => "COOLDOWN",
            Self::Done => "DONE",
        }
    }

    /// Terminal state: the context is removed once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Active Order
// ============================================================================

/// The one outstanding order owned by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrder {
    /// Exchange order ID.
    pub order_id: String,
    /// Client order ID used for placement.
    pub client_order_id: ClientOrderId,
    pub side: OrderSide,
    pub price: Price,
    /// Unfilled quantity; reduced on partial fills.
    pub quantity: Size,
    /// Quantity at placement.
    pub original_quantity: Size,
    /// Acknowledgement time (Unix milliseconds).
    pub placed_at_ms: u64,
    /// Mode the order was priced in.
    pub mode: ExecutionMode,
    pub post_only: bool,
}

impl ActiveOrder {
    /// Milliseconds the order has been resting.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.placed_at_ms)
    }

    pub fn filled_quantity(&self) -> Size {
        self.original_quantity.saturating_sub(self.quantity)
    }
}

// ============================================================================
// Order Events
// ============================================================================

/// Exchange-assigned fill (trade) identifier used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillId(String);

impl FillId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exchange-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    /// Still resting on the book.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

/// What happened to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEventKind {
    /// Execution against the order.
    Fill {
        fill_id: FillId,
        quantity: Size,
        price: Price,
    },
    /// Order left the book without a further fill (cancel, expiry, reject).
    Closed { status: OrderStatus },
}

/// Order update routed to the controller owning `(symbol, position_side)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: Symbol,
    pub position_side: PositionSide,
    pub order_id: String,
    #[serde(flatten)]
    pub kind: OrderEventKind,
    /// Event time (Unix milliseconds).
    pub time_ms: u64,
}

impl OrderEvent {
    #[must_use]
    pub fn fill(
        key: &ControllerKey,
        order_id: impl Into<String>,
        fill_id: impl Into<String>,
        quantity: Size,
        price: Price,
        time_ms: u64,
    ) -> Self {
        Self {
            symbol: key.symbol.clone(),
            position_side: key.side,
            order_id: order_id.into(),
            kind: OrderEventKind::Fill {
                fill_id: FillId::new(fill_id),
                quantity,
                price,
            },
            time_ms,
        }
    }

    #[must_use]
    pub fn closed(
        key: &ControllerKey,
        order_id: impl Into<String>,
        status: OrderStatus,
        time_ms: u64,
    ) -> Self {
        Self {
            symbol: key.symbol.clone(),
            position_side: key.side,
            order_id: order_id.into(),
            kind: OrderEventKind::Closed { status },
            time_ms,
        }
    }

    pub fn key(&self) -> ControllerKey {
        ControllerKey::new(self.symbol.clone(), self.position_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> ControllerKey {
        ControllerKey::new(Symbol::from("BTCUSDT"), PositionSide::Long)
    }

    #[test]
    fn test_controller_key_display() {
        assert_eq!(key().to_string(), "BTCUSDT:LONG");
    }

    #[test]
    fn test_active_order_age_and_filled() {
        let order = ActiveOrder {
            order_id: "1".into(),
            client_order_id: ClientOrderId::from_string("c1".into()),
            side: OrderSide::Sell,
            price: Price::new(dec!(100)),
            quantity: Size::new(dec!(0.03)),
            original_quantity: Size::new(dec!(0.05)),
            placed_at_ms: 1_000,
            mode: ExecutionMode::MakerOnly,
            post_only: true,
        };
        assert_eq!(order.age_ms(1_800), 800);
        assert_eq!(order.age_ms(500), 0);
        assert_eq!(order.filled_quantity().inner(), dec!(0.02));
    }

    #[test]
    fn test_order_event_json_shape() {
        let ev = OrderEvent::fill(
            &key(),
            "42",
            "t-1",
            Size::new(dec!(0.01)),
            Price::new(dec!(100)),
            7,
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "fill");
        assert_eq!(json["position_side"], "LONG");
        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
        assert_eq!(back.key(), key());
    }

    #[test]
    fn test_order_status_open() {
        assert!(OrderStatus::New.is_open());
        assert!(OrderStatus::PartiallyFilled.is_open());
        assert!(!OrderStatus::Canceled.is_open());
    }
}
