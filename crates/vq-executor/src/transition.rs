//! Lifecycle transition table.
//!
//! Every (state, trigger) pair is listed explicitly; pairs not listed are
//! invalid and leave the state unchanged. The controller drives all state
//! changes through [`next_state`].

use serde::Serialize;
use vq_core::ExecutionState;

/// Event that may move a controller to another state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Signal (or liquidation force) with an orderable quantity.
    Signal,
    /// Gateway acknowledged the placement.
    Acknowledged,
    /// Placement rejected, rate limited or timed out.
    PlacementFailed,
    /// Active order fully filled.
    Filled,
    /// Active order left the book without a full fill.
    OrderClosed,
    /// Active order outlived its mode TTL.
    TtlExpired,
    /// Stop requested while an order rests.
    StopRequested,
    /// Cancel confirmed, or the order is known to be gone.
    CancelConfirmed,
    CooldownElapsed,
    /// Remaining quantity rounds to zero.
    Completed,
    /// Dust remainder given up after the grace period.
    DustSwept,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Acknowledged => "acknowledged",
            Self::PlacementFailed => "placement_failed",
            Self::Filled => "filled",
            Self::OrderClosed => "order_closed",
            Self::TtlExpired => "ttl_expired",
            Self::StopRequested => "stop_requested",
            Self::CancelConfirmed => "cancel_confirmed",
            Self::CooldownElapsed => "cooldown_elapsed",
            Self::Completed => "completed",
            Self::DustSwept => "dust_swept",
        }
    }
}

/// Next state for `(from, trigger)`, `None` if the pair is not allowed.
pub fn next_state(from: ExecutionState, trigger: Trigger) -> Option<ExecutionState> {
    use ExecutionState::*;
    use Trigger::*;

    match (from, trigger) {
        (Done, _) => None,
        (Idle | Place | Wait | Cancel | Cooldown, Completed) => Some(Done),

        (Idle, Signal) => Some(Place),
        (Idle, DustSwept) => Some(Done),
        (Idle, Acknowledged | PlacementFailed | Filled | OrderClosed | TtlExpired)
        | (Idle, StopRequested | CancelConfirmed | CooldownElapsed) => None,

        (Place, Acknowledged) => Some(Wait),
        (Place, PlacementFailed) => Some(Idle),
        (Place, Signal | Filled | OrderClosed | TtlExpired | StopRequested)
        | (Place, CancelConfirmed | CooldownElapsed | DustSwept) => None,

        (Wait, Filled | OrderClosed) => Some(Idle),
        (Wait, TtlExpired | StopRequested) => Some(Cancel),
        (Wait, Signal | Acknowledged | PlacementFailed | CancelConfirmed)
        | (Wait, CooldownElapsed | DustSwept) => None,

        // a fill or close racing the cancel settles it the same way
        (Cancel, CancelConfirmed | Filled | OrderClosed) => Some(Cooldown),
        (Cancel, Signal | Acknowledged | PlacementFailed | TtlExpired)
        | (Cancel, StopRequested | CooldownElapsed | DustSwept) => None,

        (Cooldown, CooldownElapsed) => Some(Idle),
        (Cooldown, Signal | Acknowledged | PlacementFailed | Filled | OrderClosed)
        | (Cooldown, TtlExpired | StopRequested | CancelConfirmed | DustSwept) => None,
    }
}
