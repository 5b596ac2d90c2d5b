//! Risk guard.
//!
//! Combines the three independent checks into one decision per
//! evaluation pass:
//!
//! 1. Liquidation distance below threshold -> `force`
//! 2. Snapshot stale (or missing) -> `block`, even when forced
//! 3. Rate budget exhausted -> `block`; a forced exit skips only the
//!    cancel-priority queue, never the hard placement window
//!
//! The guard only advises. The placement slot itself is taken later
//! with [`RateLimiter::try_acquire_place`], which is the atomic step.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;
use vq_core::Price;
use vq_feed::MarketSnapshot;

use crate::error::{RiskError, RiskResult};
use crate::liquidation::assess_liquidation;
use crate::rate_limiter::{RateDenied, RateLimiter};

/// Per-symbol risk thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Snapshot age beyond which placements are blocked.
    #[serde(default = "default_stale_data_ms")]
    pub stale_data_ms: u64,
    /// Distance to liquidation (fraction of mark) that forces an exit.
    #[serde(default = "default_liq_distance_threshold")]
    pub liq_distance_threshold: Decimal,
}

fn default_stale_data_ms() -> u64 {
    1_500
}

fn default_liq_distance_threshold() -> Decimal {
    Decimal::new(15, 3) // 0.015
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            stale_data_ms: default_stale_data_ms(),
            liq_distance_threshold: default_liq_distance_threshold(),
        }
    }
}

impl RiskSettings {
    pub fn validate(&self) -> RiskResult<()> {
        if self.stale_data_ms == 0 {
            return Err(RiskError::ConfigError(
                "stale_data_ms must be positive".to_string(),
            ));
        }
        if self.liq_distance_threshold <= Decimal::ZERO || self.liq_distance_threshold >= Decimal::ONE
        {
            return Err(RiskError::ConfigError(format!(
                "liq_distance_threshold must be in (0, 1), got {}",
                self.liq_distance_threshold
            )));
        }
        Ok(())
    }
}

/// Position facts the guard needs, refreshed from the exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionRisk {
    pub mark_price: Option<Price>,
    pub liquidation_price: Option<Price>,
}

/// Reason attached to a risk decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    StaleMarketData,
    RateLimited,
    CancelPriority,
    LiquidationDistance,
}

impl RiskReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaleMarketData => "stale_market_data",
            Self::RateLimited => "rate_limited",
            Self::CancelPriority => "cancel_priority",
            Self::LiquidationDistance => "liq_distance_breach",
        }
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RateDenied> for RiskReason {
    fn from(denied: RateDenied) -> Self {
        match denied {
            RateDenied::WindowExhausted => Self::RateLimited,
            RateDenied::CancelPriority => Self::CancelPriority,
        }
    }
}

/// Outcome of [`RiskGuard::assess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskDecision {
    /// No new placement this pass.
    pub block: bool,
    /// Exit regardless of signal, in aggressive mode.
    pub force: bool,
    pub reason: Option<RiskReason>,
    /// Observed distance to liquidation, when known.
    pub liq_distance: Option<Decimal>,
}

impl RiskDecision {
    #[must_use]
    pub fn allows_placement(&self) -> bool {
        !self.block
    }
}

/// Risk guard shared by every controller under one credential.
#[derive(Debug, Clone)]
pub struct RiskGuard {
    limiter: Arc<RateLimiter>,
}

impl RiskGuard {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Assess one evaluation pass. `snapshot` is `None` when the
    /// instrument has never been seen, which counts as stale.
    pub fn assess(
        &self,
        settings: &RiskSettings,
        position: &PositionRisk,
        snapshot: Option<&MarketSnapshot>,
        now_ms: u64,
    ) -> RiskDecision {
        let liq = assess_liquidation(
            position.mark_price,
            position.liquidation_price,
            settings.liq_distance_threshold,
        );
        let force = liq.force;

        let stale = snapshot.map_or(true, |s| s.is_stale(now_ms, settings.stale_data_ms));
        if stale {
            trace!(force, "Placement blocked: stale market data");
            return RiskDecision {
                block: true,
                force,
                reason: Some(RiskReason::StaleMarketData),
                liq_distance: liq.distance,
            };
        }

        if let Err(denied) = self.limiter.check_place(now_ms, force) {
            return RiskDecision {
                block: true,
                force,
                reason: Some(denied.into()),
                liq_distance: liq.distance,
            };
        }

        RiskDecision {
            block: false,
            force,
            reason: force.then_some(RiskReason::LiquidationDistance),
            liq_distance: liq.distance,
        }
    }
}
