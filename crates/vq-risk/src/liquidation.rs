//! Liquidation distance.
//!
//! `dist_to_liq = |mark - liq| / mark`. Below the configured threshold the
//! guard forces an exit regardless of the signal.

use rust_decimal::Decimal;
use serde::Serialize;
use vq_core::Price;

/// Distance to liquidation relative to mark. `None` for non-positive inputs.
pub fn liq_distance(mark: Price, liquidation: Price) -> Option<Decimal> {
    if !mark.is_positive() || !liquidation.is_positive() {
        return None;
    }
    Some((mark.inner() - liquidation.inner()).abs() / mark.inner())
}

/// Outcome of the liquidation-distance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidationAssessment {
    pub force: bool,
    pub distance: Option<Decimal>,
    pub reason: &'static str,
}

/// Check liquidation proximity. Missing inputs never force.
pub fn assess_liquidation(
    mark: Option<Price>,
    liquidation: Option<Price>,
    threshold: Decimal,
) -> LiquidationAssessment {
    let Some(mark) = mark.filter(Price::is_positive) else {
        return LiquidationAssessment {
            force: false,
            distance: None,
            reason: "missing_mark_price",
        };
    };
    let Some(liquidation) = liquidation.filter(Price::is_positive) else {
        return LiquidationAssessment {
            force: false,
            distance: None,
            reason: "missing_liquidation_price",
        };
    };

    let distance = liq_distance(mark, liquidation);
    let force = distance.is_some_and(|d| d < threshold);
    LiquidationAssessment {
        force,
        distance,
        reason: if force { "liq_distance_breach" } else { "ok" },
    }
}
