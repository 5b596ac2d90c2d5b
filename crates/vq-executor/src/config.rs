//! Execution settings.
//!
//! One immutable [`SymbolSettings`] snapshot per instrument. A controller
//! reads it once per evaluation pass; reconfiguration swaps the whole
//! `Arc` instead of mutating fields.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vq_core::{ExecutionMode, Size};
use vq_risk::{ProtectiveStopConfig, RiskSettings};
use vq_signal::SignalConfig;

use crate::error::{ExecutorError, ExecutorResult};

/// Where a post-only order sits relative to the closing-side touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MakerPriceMode {
    /// At the best price on our side of the book.
    #[default]
    AtTouch,
    /// One tick inside the spread.
    #[serde(rename = "inside_spread_1tick")]
    InsideSpread1Tick,
    /// `maker_n_ticks` inside the spread.
    CustomTicks,
}

/// Order lifecycle and sizing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// TTL of a post-only order.
    #[serde(default = "default_maker_ttl_ms")]
    pub maker_ttl_ms: u64,
    /// TTL of an aggressive limit order.
    #[serde(default = "default_aggressive_ttl_ms")]
    pub aggressive_ttl_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub maker_cooldown_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub aggressive_cooldown_ms: u64,

    /// Base multiplier applied to the slice before ROI/acceleration.
    #[serde(default = "default_base_lot_mult")]
    pub base_lot_mult: Decimal,
    /// Quantity of one unmultiplied slice; `None` means the instrument
    /// minimum order quantity.
    #[serde(default)]
    pub base_slice_qty: Option<Size>,
    #[serde(default = "default_max_mult")]
    pub max_mult: Decimal,
    /// Per-order notional cap in quote currency.
    #[serde(default)]
    pub max_order_notional: Option<Decimal>,

    #[serde(default)]
    pub maker_price_mode: MakerPriceMode,
    #[serde(default = "default_maker_n_ticks")]
    pub maker_n_ticks: u32,
    /// Minimum distance (ticks) between a post-only price and the
    /// opposite touch. Values below 1 act as 1.
    #[serde(default = "default_maker_safety_ticks")]
    pub maker_safety_ticks: u32,
    /// Ticks an aggressive order crosses beyond the opposite touch.
    #[serde(default = "default_aggressive_offset_ticks")]
    pub aggressive_offset_ticks: u32,

    /// Consecutive maker timeouts before escalating to aggressive mode.
    #[serde(default = "default_maker_timeouts_to_escalate")]
    pub maker_timeouts_to_escalate: u32,
    /// Fills in aggressive mode before returning to maker mode.
    #[serde(default = "default_aggr_fills_to_deescalate")]
    pub aggr_fills_to_deescalate: u32,
    /// Consecutive aggressive timeouts before returning to maker mode.
    #[serde(default = "default_aggr_timeouts_to_deescalate")]
    pub aggr_timeouts_to_deescalate: u32,

    /// Upper bound on the local retry backoff; the effective backoff is
    /// also capped at half the mode TTL.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Continuous dust duration after which the side is swept to DONE.
    #[serde(default = "default_dust_grace_ms")]
    pub dust_grace_ms: u64,
    /// Position quantity drift tolerated before reconciling to the gateway.
    #[serde(default)]
    pub quantity_tolerance: Size,
}

fn default_maker_ttl_ms() -> u64 {
    800
}

fn default_aggressive_ttl_ms() -> u64 {
    2_000
}

fn default_cooldown_ms() -> u64 {
    200
}

fn default_base_lot_mult() -> Decimal {
    Decimal::ONE
}

fn default_max_mult() -> Decimal {
    Decimal::from(50)
}

fn default_maker_n_ticks() -> u32 {
    1
}

fn default_maker_safety_ticks() -> u32 {
    1
}

fn default_aggressive_offset_ticks() -> u32 {
    1
}

fn default_maker_timeouts_to_escalate() -> u32 {
    3
}

fn default_aggr_fills_to_deescalate() -> u32 {
    1
}

fn default_aggr_timeouts_to_deescalate() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_dust_grace_ms() -> u64 {
    5_000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            maker_ttl_ms: default_maker_ttl_ms(),
            aggressive_ttl_ms: default_aggressive_ttl_ms(),
            maker_cooldown_ms: default_cooldown_ms(),
            aggressive_cooldown_ms: default_cooldown_ms(),
            base_lot_mult: default_base_lot_mult(),
            base_slice_qty: None,
            max_mult: default_max_mult(),
            max_order_notional: None,
            maker_price_mode: MakerPriceMode::default(),
            maker_n_ticks: default_maker_n_ticks(),
            maker_safety_ticks: default_maker_safety_ticks(),
            aggressive_offset_ticks: default_aggressive_offset_ticks(),
            maker_timeouts_to_escalate: default_maker_timeouts_to_escalate(),
            aggr_fills_to_deescalate: default_aggr_fills_to_deescalate(),
            aggr_timeouts_to_deescalate: default_aggr_timeouts_to_deescalate(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dust_grace_ms: default_dust_grace_ms(),
            quantity_tolerance: Size::ZERO,
        }
    }
}

impl ExecutionSettings {
    pub fn ttl_ms(&self, mode: ExecutionMode) -> u64 {
        match mode {
            ExecutionMode::MakerOnly => self.maker_ttl_ms,
            ExecutionMode::AggressiveLimit => self.aggressive_ttl_ms,
        }
    }

    pub fn cooldown_ms(&self, mode: ExecutionMode) -> u64 {
        match mode {
            ExecutionMode::MakerOnly => self.maker_cooldown_ms,
            ExecutionMode::AggressiveLimit => self.aggressive_cooldown_ms,
        }
    }

    /// Local retry backoff for `mode`, bounded by half its TTL.
    pub fn retry_backoff_ms(&self, mode: ExecutionMode) -> u64 {
        self.retry_backoff_ms.min(self.ttl_ms(mode) / 2)
    }

    pub fn effective_safety_ticks(&self) -> u32 {
        self.maker_safety_ticks.max(1)
    }

    /// Ticks a maker order sits inside the spread.
    pub fn maker_inside_ticks(&self) -> u32 {
        match self.maker_price_mode {
            MakerPriceMode::AtTouch => 0,
            MakerPriceMode::InsideSpread1Tick => 1,
            MakerPriceMode::CustomTicks => self.maker_n_ticks,
        }
    }

    pub fn validate(&self) -> ExecutorResult<()> {
        if self.maker_ttl_ms == 0 || self.aggressive_ttl_ms == 0 {
            return Err(ExecutorError::Config(
                "order TTLs must be positive".to_string(),
            ));
        }
        if self.base_lot_mult < Decimal::ZERO {
            return Err(ExecutorError::Config(format!(
                "base_lot_mult must be non-negative, got {}",
                self.base_lot_mult
            )));
        }
        if self.max_mult < self.base_lot_mult {
            return Err(ExecutorError::Config(format!(
                "max_mult ({}) must be >= base_lot_mult ({})",
                self.max_mult, self.base_lot_mult
            )));
        }
        if let Some(slice) = self.base_slice_qty {
            if !slice.is_positive() {
                return Err(ExecutorError::Config(format!(
                    "base_slice_qty must be positive, got {slice}"
                )));
            }
        }
        if let Some(cap) = self.max_order_notional {
            if cap <= Decimal::ZERO {
                return Err(ExecutorError::Config(format!(
                    "max_order_notional must be positive, got {cap}"
                )));
            }
        }
        if self.maker_timeouts_to_escalate == 0 {
            return Err(ExecutorError::Config(
                "maker_timeouts_to_escalate must be at least 1".to_string(),
            ));
        }
        if self.quantity_tolerance.inner().is_sign_negative() {
            return Err(ExecutorError::Config(
                "quantity_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fully merged settings for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSettings {
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub protective_stop: ProtectiveStopConfig,
}

impl SymbolSettings {
    pub fn validate(&self) -> ExecutorResult<()> {
        self.execution.validate()?;
        self.signal
            .validate()
            .map_err(|e| ExecutorError::Config(e.to_string()))?;
        self.risk
            .validate()
            .map_err(|e| ExecutorError::Config(e.to_string()))?;
        if self.protective_stop.enabled {
            self.protective_stop
                .validate()
                .map_err(|e| ExecutorError::Config(e.to_string()))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_validate() {
        assert!(SymbolSettings::default().validate().is_ok());
        let s = ExecutionSettings::default();
        assert_eq!(s.ttl_ms(ExecutionMode::MakerOnly), 800);
        assert_eq!(s.ttl_ms(ExecutionMode::AggressiveLimit), 2_000);
    }

    #[test]
    fn test_retry_backoff_bounded_by_ttl() {
        let s = ExecutionSettings {
            maker_ttl_ms: 100,
            retry_backoff_ms: 500,
            ..Default::default()
        };
        assert_eq!(s.retry_backoff_ms(ExecutionMode::MakerOnly), 50);
        assert_eq!(s.retry_backoff_ms(ExecutionMode::AggressiveLimit), 500);
    }

    #[test]
    fn test_rejects_max_mult_below_base() {
        let s = ExecutionSettings {
            base_lot_mult: dec!(2),
            max_mult: dec!(1),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_maker_inside_ticks() {
        let mut s = ExecutionSettings::default();
        assert_eq!(s.maker_inside_ticks(), 0);
        s.maker_price_mode = MakerPriceMode::CustomTicks;
        s.maker_n_ticks = 3;
        assert_eq!(s.maker_inside_ticks(), 3);
        s.maker_safety_ticks = 0;
        assert_eq!(s.effective_safety_ticks(), 1);
    }

    #[test]
    fn test_parse_from_toml() {
        let s: ExecutionSettings = toml::from_str(
            r#"
            maker_ttl_ms = 1000
            maker_price_mode = "inside_spread_1tick"
            base_slice_qty = "0.05"
            max_order_notional = "500"
            "#,
        )
        .unwrap();
        assert_eq!(s.maker_ttl_ms, 1_000);
        assert_eq!(s.maker_price_mode, MakerPriceMode::InsideSpread1Tick);
        assert_eq!(s.base_slice_qty, Some(Size::new(dec!(0.05))));
        assert_eq!(s.max_order_notional, Some(dec!(500)));
        assert_eq!(s.aggressive_ttl_ms, 2_000);
    }
}
