//! Exchange-side protective stops.
//!
//! One STOP_MARKET (mark-price triggered, reduce-only) per live position
//! side, placed at a fixed distance to liquidation so the position is cut
//! by the exchange even if this process is gone.
//!
//! Trigger price from `dist_to_liq = |mark - liq| / mark`:
//! - LONG:  `liq / (1 - d)`, rounded up (triggers earlier)
//! - SHORT: `liq / (1 + d)`, rounded down (triggers earlier)
//!
//! A resting stop is only ever tightened, never loosened.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vq_core::{ClientOrderId, PositionSide, Price, Symbol};

use crate::error::{RiskError, RiskResult};

/// Protective stop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveStopConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Distance to liquidation at which the stop triggers.
    #[serde(default = "default_dist_to_liq")]
    pub dist_to_liq: Decimal,
    /// Client order ID prefix identifying our stops across restarts.
    #[serde(default = "default_client_order_id_prefix")]
    pub client_order_id_prefix: String,
}

fn default_dist_to_liq() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_client_order_id_prefix() -> String {
    "vq-ps-".to_string()
}

impl Default for ProtectiveStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dist_to_liq: default_dist_to_liq(),
            client_order_id_prefix: default_client_order_id_prefix(),
        }
    }
}

impl ProtectiveStopConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.dist_to_liq <= Decimal::ZERO || self.dist_to_liq >= Decimal::ONE {
            return Err(RiskError::ConfigError(format!(
                "protective_stop.dist_to_liq must be in (0, 1), got {}",
                self.dist_to_liq
            )));
        }
        Ok(())
    }
}

/// Trigger price for a protective stop.
pub fn compute_stop_price(
    side: PositionSide,
    liquidation: Price,
    dist_to_liq: Decimal,
    tick_size: Price,
) -> RiskResult<Price> {
    if !liquidation.is_positive() {
        return Err(RiskError::InvalidInput(format!(
            "liquidation price must be positive, got {liquidation}"
        )));
    }
    if dist_to_liq <= Decimal::ZERO || dist_to_liq >= Decimal::ONE {
        return Err(RiskError::InvalidInput(format!(
            "dist_to_liq must be in (0, 1), got {dist_to_liq}"
        )));
    }
    let price = match side {
        PositionSide::Long => {
            Price::new(liquidation.inner() / (Decimal::ONE - dist_to_liq)).round_up_to_tick(tick_size)
        }
        PositionSide::Short => {
            Price::new(liquidation.inner() / (Decimal::ONE + dist_to_liq)).round_to_tick(tick_size)
        }
    };
    Ok(price)
}

/// A stop we already have resting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingStop {
    pub order_id: String,
    pub client_order_id: ClientOrderId,
    pub stop_price: Price,
}

/// What to do with the protective stop of one position side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopAction {
    Keep,
    Place {
        stop_price: Price,
        client_order_id: ClientOrderId,
    },
    /// Cancel the old stop, then place the tighter one.
    Replace {
        cancel_order_id: String,
        stop_price: Price,
        client_order_id: ClientOrderId,
    },
    Cancel {
        order_id: String,
        reason: &'static str,
    },
}

/// Plans protective stop maintenance for one position side.
#[derive(Debug, Clone)]
pub struct ProtectiveStopPlanner {
    config: ProtectiveStopConfig,
}

impl ProtectiveStopPlanner {
    #[must_use]
    pub fn new(config: ProtectiveStopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtectiveStopConfig {
        &self.config
    }

    /// Client order ID prefix for `(symbol, side)`.
    pub fn client_order_id_prefix(&self, symbol: &Symbol, side: PositionSide) -> String {
        format!(
            "{}{}-{}",
            self.config.client_order_id_prefix,
            symbol.stream_name(),
            side.code()
        )
    }

    /// Whether `cid` belongs to our stop for `(symbol, side)`.
    pub fn owns(&self, cid: &ClientOrderId, symbol: &Symbol, side: PositionSide) -> bool {
        cid.as_str()
            .starts_with(&self.client_order_id_prefix(symbol, side))
    }

    pub fn new_client_order_id(&self, symbol: &Symbol, side: PositionSide) -> ClientOrderId {
        ClientOrderId::with_prefix(&self.client_order_id_prefix(symbol, side))
    }

    /// Decide the next action.
    ///
    /// `has_position` is false once the side is flat; any resting stop is
    /// then cancelled so it cannot open a new position.
    pub fn plan(
        &self,
        symbol: &Symbol,
        side: PositionSide,
        has_position: bool,
        liquidation: Option<Price>,
        tick_size: Price,
        existing: Option<&ExistingStop>,
    ) -> StopAction {
        if !self.config.enabled || !has_position {
            return match existing {
                Some(stop) => StopAction::Cancel {
                    order_id: stop.order_id.clone(),
                    reason: if has_position {
                        "cancel_disabled"
                    } else {
                        "cancel_no_position"
                    },
                },
                None => StopAction::Keep,
            };
        }

        let Some(liquidation) = liquidation.filter(Price::is_positive) else {
            return StopAction::Keep;
        };
        let Ok(desired) =
            compute_stop_price(side, liquidation, self.config.dist_to_liq, tick_size)
        else {
            return StopAction::Keep;
        };

        match existing {
            None => StopAction::Place {
                stop_price: desired,
                client_order_id: self.new_client_order_id(symbol, side),
            },
            Some(stop) => {
                let current = stop.stop_price.round_to_tick(tick_size);
                let looser = match side {
                    PositionSide::Long => desired < current,
                    PositionSide::Short => desired > current,
                };
                if looser || desired == current {
                    StopAction::Keep
                } else {
                    StopAction::Replace {
                        cancel_order_id: stop.order_id.clone(),
                        stop_price: desired,
                        client_order_id: self.new_client_order_id(symbol, side),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick() -> Price {
        Price::new(dec!(0.1))
    }

    fn planner() -> ProtectiveStopPlanner {
        ProtectiveStopPlanner::new(ProtectiveStopConfig {
            enabled: true,
            dist_to_liq: dec!(0.01),
            ..Default::default()
        })
    }

    fn sym() -> Symbol {
        Symbol::from("BTC/USDT:USDT")
    }

    fn existing(price: Decimal) -> ExistingStop {
        ExistingStop {
            order_id: "77".into(),
            client_order_id: planner().new_client_order_id(&sym(), PositionSide::Long),
            stop_price: Price::new(price),
        }
    }

    #[test]
    fn test_stop_price_long_rounds_up() {
        // 99 / 0.99 = 100
        let p = compute_stop_price(PositionSide::Long, Price::new(dec!(99)), dec!(0.01), tick())
            .unwrap();
        assert_eq!(p.inner(), dec!(100));

        // 100 / 0.99 = 101.0101.. -> 101.1
        let p = compute_stop_price(PositionSide::Long, Price::new(dec!(100)), dec!(0.01), tick())
            .unwrap();
        assert_eq!(p.inner(), dec!(101.1));
    }

    #[test]
    fn test_stop_price_short_rounds_down() {
        // 100 / 1.01 = 99.0099.. -> 99.0
        let p = compute_stop_price(
            PositionSide::Short,
            Price::new(dec!(100)),
            dec!(0.01),
            tick(),
        )
        .unwrap();
        assert_eq!(p.inner(), dec!(99.0));
    }

    #[test]
    fn test_stop_price_rejects_bad_inputs() {
        assert!(compute_stop_price(PositionSide::Long, Price::ZERO, dec!(0.01), tick()).is_err());
        assert!(
            compute_stop_price(PositionSide::Long, Price::new(dec!(1)), dec!(1), tick()).is_err()
        );
        assert!(
            compute_stop_price(PositionSide::Long, Price::new(dec!(1)), dec!(0), tick()).is_err()
        );
    }

    #[test]
    fn test_plan_place_when_missing() {
        let action = planner().plan(
            &sym(),
            PositionSide::Long,
            true,
            Some(Price::new(dec!(99))),
            tick(),
            None,
        );
        match action {
            StopAction::Place {
                stop_price,
                client_order_id,
            } => {
                assert_eq!(stop_price.inner(), dec!(100));
                assert!(client_order_id.as_str().starts_with("vq-ps-btcusdt-L"));
                assert!(client_order_id.as_str().len() <= ClientOrderId::MAX_LEN);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_plan_only_tightens() {
        let p = planner();
        // desired 100, resting at 100.5 (tighter for LONG) -> keep
        let keep = p.plan(
            &sym(),
            PositionSide::Long,
            true,
            Some(Price::new(dec!(99))),
            tick(),
            Some(&existing(dec!(100.5))),
        );
        assert_eq!(keep, StopAction::Keep);

        // resting at 99.5 (looser) -> replace with 100
        let replace = p.plan(
            &sym(),
            PositionSide::Long,
            true,
            Some(Price::new(dec!(99))),
            tick(),
            Some(&existing(dec!(99.5))),
        );
        assert!(matches!(
            replace,
            StopAction::Replace { ref cancel_order_id, stop_price, .. }
                if cancel_order_id == "77" && stop_price.inner() == dec!(100)
        ));
    }

    #[test]
    fn test_plan_cancel_when_flat() {
        let action = planner().plan(
            &sym(),
            PositionSide::Long,
            false,
            None,
            tick(),
            Some(&existing(dec!(100))),
        );
        assert_eq!(
            action,
            StopAction::Cancel {
                order_id: "77".into(),
                reason: "cancel_no_position"
            }
        );
    }

    #[test]
    fn test_plan_keep_without_liquidation_price() {
        let action = planner().plan(&sym(), PositionSide::Short, true, None, tick(), None);
        assert_eq!(action, StopAction::Keep);
    }

    #[test]
    fn test_owns_matches_prefix() {
        let p = planner();
        let cid = p.new_client_order_id(&sym(), PositionSide::Short);
        assert!(p.owns(&cid, &sym(), PositionSide::Short));
        assert!(!p.owns(&cid, &sym(), PositionSide::Long));
    }
}
