//! Instrument identification and exchange constraints.
//!
//! Symbols follow the unified `BASE/QUOTE:SETTLE` notation
//! (e.g. `BTC/USDT:USDT`). Lot/tick constraints come from the exchange
//! and must be respected by every quantity and price we send.

use crate::error::{CoreError, Result};
use crate::{Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compact stream form: `BTC/USDT:USDT` -> `btcusdt`.
    pub fn stream_name(&self) -> String {
        let base_quote = self.0.split(':').next().unwrap_or(&self.0);
        base_quote.replace('/', "").to_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Exchange lot and tick constraints for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentLimits {
    /// Minimum quantity increment.
    pub step_size: Size,
    /// Minimum order quantity.
    pub min_qty: Size,
    /// Minimum price increment.
    pub tick_size: Price,
}

impl InstrumentLimits {
    pub fn new(step_size: Size, min_qty: Size, tick_size: Price) -> Result<Self> {
        let limits = Self {
            step_size,
            min_qty,
            tick_size,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Reject non-positive steps and ticks.
    pub fn validate(&self) -> Result<()> {
        if !self.step_size.is_positive() {
            return Err(CoreError::InvalidLimits(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }
        if !self.tick_size.is_positive() {
            return Err(CoreError::InvalidLimits(format!(
                "tick_size must be positive, got {}",
                self.tick_size
            )));
        }
        if self.min_qty.inner().is_sign_negative() {
            return Err(CoreError::InvalidLimits(format!(
                "min_qty must be non-negative, got {}",
                self.min_qty
            )));
        }
        Ok(())
    }

    /// Round a quantity down to the lot step.
    pub fn round_qty(&self, qty: Size) -> Size {
        qty.round_to_lot(self.step_size)
    }

    /// True when the quantity rounds to zero under the lot step.
    pub fn rounds_to_zero(&self, qty: Size) -> bool {
        self.round_qty(qty).is_zero()
    }

    /// True when a stepped quantity satisfies the minimum order quantity.
    pub fn is_orderable(&self, qty: Size) -> bool {
        let stepped = self.round_qty(qty);
        stepped.is_positive() && stepped >= self.min_qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> InstrumentLimits {
        InstrumentLimits::new(
            Size::new(dec!(0.001)),
            Size::new(dec!(0.01)),
            Price::new(dec!(0.1)),
        )
        .unwrap()
    }

    #[test]
    fn test_symbol_stream_name() {
        assert_eq!(Symbol::from("BTC/USDT:USDT").stream_name(), "btcusdt");
        assert_eq!(Symbol::from("ETHUSDT").stream_name(), "ethusdt");
    }

    #[test]
    fn test_limits_reject_zero_step() {
        let err = InstrumentLimits::new(Size::ZERO, Size::new(dec!(0.01)), Price::new(dec!(0.1)));
        assert!(err.is_err());
    }

    #[test]
    fn test_round_qty() {
        let l = limits();
        assert_eq!(l.round_qty(Size::new(dec!(0.0509))).inner(), dec!(0.050));
        assert!(l.rounds_to_zero(Size::new(dec!(0.0009))));
        assert!(!l.rounds_to_zero(Size::new(dec!(0.001))));
    }

    #[test]
    fn test_is_orderable() {
        let l = limits();
        assert!(l.is_orderable(Size::new(dec!(0.01))));
        assert!(!l.is_orderable(Size::new(dec!(0.008))));
        assert!(!l.is_orderable(Size::ZERO));
    }
}
