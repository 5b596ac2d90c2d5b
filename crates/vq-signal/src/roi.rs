//! Return-on-margin multiplier.
//!
//! `roi = unrealized_pnl / (|qty| * entry_price / leverage)`. The
//! multiplier comes from the highest ROI tier at or below `roi`.

use rust_decimal::Decimal;
use vq_core::{PositionSide, Price, Size};

use crate::config::{select_tier, RoiConfig};

/// Mark-to-market PnL of a position side.
pub fn unrealized_pnl(side: PositionSide, quantity: Size, entry: Price, mark: Price) -> Decimal {
    let diff = mark.inner() - entry.inner();
    match side {
        PositionSide::Long => diff * quantity.inner(),
        PositionSide::Short => -diff * quantity.inner(),
    }
}

/// ROI on initial margin. `None` when quantity, entry or leverage is
/// non-positive.
pub fn compute_roi(
    unrealized_pnl: Decimal,
    quantity: Size,
    entry: Price,
    leverage: Decimal,
) -> Option<Decimal> {
    if !quantity.is_positive() || !entry.is_positive() || leverage <= Decimal::ZERO {
        return None;
    }
    let margin = quantity.inner().abs() * entry.inner() / leverage;
    if margin <= Decimal::ZERO {
        return None;
    }
    Some(unrealized_pnl / margin)
}

/// Multiplier for `roi`; 1 when unknown or below every tier.
pub fn roi_multiplier(roi: Option<Decimal>, config: &RoiConfig) -> Decimal {
    roi.and_then(|r| select_tier(&config.tiers, r))
        .map(|i| config.tiers[i].multiplier)
        .unwrap_or(Decimal::ONE)
}
