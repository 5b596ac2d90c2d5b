//! Exit signal evaluation for the reduce-only executor.
//!
//! Decides whether an exit condition holds for one position side given
//! the current market snapshot, and how hard to lean into it:
//! - Trigger: trade-through plus touch confirmation, or touch improvement
//! - Acceleration multiplier from windowed returns
//! - ROI multiplier from the position's return on margin
//!
//! Evaluation is a pure function of the snapshot and configuration. The
//! per-side signal throttle lives outside it in [`throttle`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod roi;
pub mod signal;
pub mod throttle;

pub use config::{
    AccelComparison, AccelConfig, ImprovementThreshold, MultiplierTier, RoiConfig, SignalConfig,
};
pub use error::SignalError;
pub use evaluator::{acceleration, evaluate};
pub use roi::{compute_roi, roi_multiplier, unrealized_pnl};
pub use signal::{AccelReading, SignalReason, SignalResult};
pub use throttle::SignalThrottle;
