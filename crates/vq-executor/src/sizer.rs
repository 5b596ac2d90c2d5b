//! Quantity sizer.
//!
//! Turns the remaining position, the configured slice and the live
//! multipliers into one order quantity:
//!
//! 1. `final_mult = clamp(base * roi * accel, 0, max_mult)`
//! 2. `raw = min(remaining, base_slice * final_mult)`
//! 3. Notional cap at the reference price, then floor to the lot step
//! 4. Below `min_qty`: promote to the whole remainder when that is itself
//!    orderable, otherwise the remainder is dust
//! 5. A slice that would leave dust behind takes the whole remainder
//!
//! The result never exceeds the step-rounded remainder.

use rust_decimal::Decimal;
use vq_core::{InstrumentLimits, Price, Size};

use crate::config::ExecutionSettings;

/// Why no order can be sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotOrderable {
    /// Remainder is positive but below `min_qty`.
    Dust,
    /// Multipliers collapsed to zero.
    ZeroMultiplier,
    /// The notional cap leaves less than `min_qty`.
    NotionalCap,
}

impl NotOrderable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dust => "dust",
            Self::ZeroMultiplier => "zero_multiplier",
            Self::NotionalCap => "notional_cap",
        }
    }
}

/// Sizing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDecision {
    Order { quantity: Size, final_mult: Decimal },
    /// Nothing left under the lot step.
    Complete,
    NotOrderable(NotOrderable),
}

impl SizeDecision {
    pub fn quantity(&self) -> Option<Size> {
        match self {
            Self::Order { quantity, .. } => Some(*quantity),
            Self::Complete | Self::NotOrderable(_) => None,
        }
    }
}

/// Size one slice.
///
/// `reference_price` is only needed when a notional cap is configured; a
/// missing price with a cap configured is not orderable.
pub fn size(
    remaining: Size,
    roi_mult: Decimal,
    accel_mult: Decimal,
    settings: &ExecutionSettings,
    limits: &InstrumentLimits,
    reference_price: Option<Price>,
) -> SizeDecision {
    let stepped_remaining = limits.round_qty(remaining);
    if !stepped_remaining.is_positive() {
        return SizeDecision::Complete;
    }

    let final_mult = (settings.base_lot_mult * roi_mult * accel_mult)
        .max(Decimal::ZERO)
        .min(settings.max_mult);
    if final_mult.is_zero() {
        return SizeDecision::NotOrderable(NotOrderable::ZeroMultiplier);
    }

    let base_slice = settings.base_slice_qty.unwrap_or(limits.min_qty);
    let mut raw = (base_slice.inner() * final_mult).min(stepped_remaining.inner());

    let cap_qty = match notional_cap_qty(settings, reference_price) {
        Ok(cap) => cap,
        Err(reason) => return SizeDecision::NotOrderable(reason),
    };
    if let Some(cap) = cap_qty {
        raw = raw.min(cap);
    }

    let mut qty = limits.round_qty(Size::new(raw));
    if qty < limits.min_qty || !qty.is_positive() {
        if stepped_remaining < limits.min_qty {
            return SizeDecision::NotOrderable(NotOrderable::Dust);
        }
        if cap_qty.is_some_and(|cap| stepped_remaining.inner() > cap) {
            return SizeDecision::NotOrderable(NotOrderable::NotionalCap);
        }
        qty = stepped_remaining;
    }

    // Leftover that could never be ordered rides along with this slice.
    let leftover = stepped_remaining.saturating_sub(qty);
    if leftover.is_positive()
        && leftover < limits.min_qty
        && cap_qty.map_or(true, |cap| stepped_remaining.inner() <= cap)
    {
        qty = stepped_remaining;
    }

    SizeDecision::Order {
        quantity: qty,
        final_mult,
    }
}

/// Quantity allowed by the notional cap, `None` when uncapped.
fn notional_cap_qty(
    settings: &ExecutionSettings,
    reference_price: Option<Price>,
) -> Result<Option<Decimal>, NotOrderable> {
    let Some(max_notional) = settings.max_order_notional else {
        return Ok(None);
    };
    match reference_price.filter(Price::is_positive) {
        Some(price) => Ok(Some(max_notional / price.inner())),
        None => Err(NotOrderable::NotionalCap),
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

    fn settings(slice: Decimal) -> ExecutionSettings {
        ExecutionSettings {
            base_slice_qty: Some(Size::new(slice)),
            ..Default::default()
        }
    }

    fn qty(d: &SizeDecision) -> Decimal {
        d.quantity().expect("orderable").inner()
    }

    #[test]
    fn test_unit_multipliers_take_one_slice() {
        let d = size(
            Size::new(dec!(1.0)),
            Decimal::ONE,
            Decimal::ONE,
            &settings(dec!(0.05)),
            &limits(),
            None,
        );
        assert_eq!(qty(&d), dec!(0.05));
    }

    #[test]
    fn test_remainder_below_min_qty_is_dust() {
        let d = size(
            Size::new(dec!(0.008)),
            Decimal::ONE,
            Decimal::ONE,
            &settings(dec!(0.05)),
            &limits(),
            None,
        );
        assert_eq!(d, SizeDecision::NotOrderable(NotOrderable::Dust));
    }

    #[test]
    fn test_sub_step_remainder_is_complete() {
        let d = size(
            Size::new(dec!(0.0004)),
            Decimal::ONE,
            Decimal::ONE,
            &settings(dec!(0.05)),
            &limits(),
            None,
        );
        assert_eq!(d, SizeDecision::Complete);
    }

    #[test]
    fn test_multipliers_scale_and_clamp() {
        let mut s = settings(dec!(0.01));
        s.max_mult = dec!(4);
        // 2 * 3 = 6, clamped to 4
        let d = size(Size::new(dec!(1)), dec!(2), dec!(3), &s, &limits(), None);
        assert_eq!(qty(&d), dec!(0.04));
        assert!(matches!(d, SizeDecision::Order { final_mult, .. } if final_mult == dec!(4)));
    }

    #[test]
    fn test_zero_multiplier_not_orderable() {
        let d = size(
            Size::new(dec!(1)),
            Decimal::ZERO,
            Decimal::ONE,
            &settings(dec!(0.05)),
            &limits(),
            None,
        );
        assert_eq!(d, SizeDecision::NotOrderable(NotOrderable::ZeroMultiplier));
    }

    #[test]
    fn test_notional_cap_then_step() {
        let mut s = settings(dec!(0.5));
        s.max_order_notional = Some(dec!(1000));
        // cap 1000 / 30000 = 0.0333.. -> 0.033
        let d = size(
            Size::new(dec!(1)),
            Decimal::ONE,
            Decimal::ONE,
            &s,
            &limits(),
            Some(Price::new(dec!(30000))),
        );
        assert_eq!(qty(&d), dec!(0.033));
    }

    #[test]
    fn test_notional_cap_without_price_not_orderable() {
        let mut s = settings(dec!(0.05));
        s.max_order_notional = Some(dec!(1000));
        let d = size(Size::new(dec!(1)), Decimal::ONE, Decimal::ONE, &s, &limits(), None);
        assert_eq!(d, SizeDecision::NotOrderable(NotOrderable::NotionalCap));
    }

    #[test]
    fn test_promotes_to_remaining_when_slice_below_min() {
        // slice 0.005 < min 0.01, remaining 0.012 is orderable
        let d = size(
            Size::new(dec!(0.012)),
            Decimal::ONE,
            Decimal::ONE,
            &settings(dec!(0.005)),
            &limits(),
            None,
        );
        assert_eq!(qty(&d), dec!(0.012));
    }

    #[test]
    fn test_promotion_blocked_by_cap() {
        let mut s = settings(dec!(0.005));
        s.max_order_notional = Some(dec!(100));
        // cap 100 / 10000 = 0.01 < remaining 0.012
        let d = size(
            Size::new(dec!(0.012)),
            Decimal::ONE,
            Decimal::ONE,
            &s,
            &limits(),
            Some(Price::new(dec!(10000))),
        );
        assert_eq!(d, SizeDecision::NotOrderable(NotOrderable::NotionalCap));
    }

    #[test]
    fn test_dust_leftover_merged_into_slice() {
        // 0.055 - 0.05 = 0.005 would be dust
        let d = size(
            Size::new(dec!(0.055)),
            Decimal::ONE,
            Decimal::ONE,
            &settings(dec!(0.05)),
            &limits(),
            None,
        );
        assert_eq!(qty(&d), dec!(0.055));
    }

    #[test]
    fn test_never_exceeds_remaining_and_is_stepped() {
        let s = settings(dec!(0.037));
        for remaining in [dec!(0.0101), dec!(0.05), dec!(0.3333), dec!(2.71828)] {
            for accel in [dec!(1), dec!(1.7), dec!(3)] {
                if let SizeDecision::Order { quantity, .. } =
                    size(Size::new(remaining), Decimal::ONE, accel, &s, &limits(), None)
                {
                    assert!(quantity.inner() <= remaining);
                    assert_eq!(limits().round_qty(quantity), quantity);
                }
            }
        }
    }
}
