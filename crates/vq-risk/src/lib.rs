//! Risk guard for reduce-only exits.
//!
//! Independent veto/override authority over every placement:
//! - StaleMarketData: snapshot older than the configured threshold blocks
//! - Liquidation distance: mark too close to liquidation forces an exit
//! - Rate limiting: shared per-credential placement/cancel budgets, with
//!   cancels served before new placements
//!
//! Also provides:
//! - ProtectiveStopPlanner: exchange-side stop maintenance per position side

pub mod error;
pub mod guard;
pub mod liquidation;
pub mod protective_stop;
pub mod rate_limiter;

pub use error::{RiskError, RiskResult};
pub use guard::{PositionRisk, RiskDecision, RiskGuard, RiskReason, RiskSettings};
pub use liquidation::{assess_liquidation, liq_distance, LiquidationAssessment};
pub use protective_stop::{
    compute_stop_price, ExistingStop, ProtectiveStopConfig, ProtectiveStopPlanner, StopAction,
};
pub use rate_limiter::{RateDenied, RateLimitConfig, RateLimiter};
