//! Signal evaluation results.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Why an exit signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    /// Uptick with the bid holding at or above the print.
    LongPrimary,
    /// Bid stepped up through the previous print.
    LongBidImprove,
    /// Downtick with the ask holding at or below the print.
    ShortPrimary,
    /// Ask stepped down through the previous print.
    ShortAskImprove,
    /// Risk guard forced the exit (liquidation proximity).
    LiquidationForced,
}

impl SignalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongPrimary => "long_primary",
            Self::LongBidImprove => "long_bid_improve",
            Self::ShortPrimary => "short_primary",
            Self::ShortAskImprove => "short_ask_improve",
            Self::LiquidationForced => "liquidation_forced",
        }
    }
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceleration outcome of the winning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccelReading {
    pub window_ms: u64,
    /// Signed return over the window.
    pub window_return: Decimal,
    /// Index into the configured tier list.
    pub tier: usize,
}

/// Output of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalResult {
    pub triggered: bool,
    pub reason: Option<SignalReason>,
    /// Always `>= 1`.
    pub acceleration_mult: Decimal,
    /// Winning acceleration window, when any tier was satisfied.
    pub accel: Option<AccelReading>,
}

impl SignalResult {
    /// Not triggered, neutral multiplier.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            triggered: false,
            reason: None,
            acceleration_mult: Decimal::ONE,
            accel: None,
        }
    }

    #[must_use]
    pub fn triggered(reason: SignalReason, acceleration_mult: Decimal) -> Self {
        Self {
            triggered: true,
            reason: Some(reason),
            acceleration_mult,
            accel: None,
        }
    }

    /// Upgrade to a forced exit, keeping the acceleration reading.
    #[must_use]
    pub fn forced(mut self) -> Self {
        if !self.triggered {
            self.triggered = true;
            self.reason = Some(SignalReason::LiquidationForced);
        }
        self
    }
}

impl Default for SignalResult {
    fn default() -> Self {
        Self::idle()
    }
}
