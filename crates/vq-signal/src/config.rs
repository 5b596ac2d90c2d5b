//! Signal configuration.
//!
//! Tier lists are read-only after validation: thresholds strictly
//! ascending, selection walks from the most aggressive tier downward.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// One (threshold, multiplier) step of a tier ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierTier {
    pub threshold: Decimal,
    pub multiplier: Decimal,
}

impl MultiplierTier {
    #[must_use]
    pub fn new(threshold: Decimal, multiplier: Decimal) -> Self {
        Self {
            threshold,
            multiplier,
        }
    }
}

/// Index of the highest tier whose threshold does not exceed `value`.
pub fn select_tier(tiers: &[MultiplierTier], value: Decimal) -> Option<usize> {
    tiers.iter().rposition(|t| t.threshold <= value)
}

fn validate_tiers(name: &str, tiers: &[MultiplierTier]) -> Result<()> {
    for pair in tiers.windows(2) {
        if pair[1].threshold <= pair[0].threshold {
            return Err(SignalError::ConfigError(format!(
                "{name} tiers must have strictly ascending thresholds ({} then {})",
                pair[0].threshold, pair[1].threshold
            )));
        }
    }
    if let Some(t) = tiers.iter().find(|t| t.multiplier.is_sign_negative()) {
        return Err(SignalError::ConfigError(format!(
            "{name} tier multiplier must be non-negative, got {}",
            t.multiplier
        )));
    }
    Ok(())
}

/// Minimum touch improvement required by the bid/ask-improve trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementThreshold {
    /// Whole ticks over the previous touch.
    Ticks(u32),
    /// Basis points over the previous touch.
    Bps(Decimal),
}

impl Default for ImprovementThreshold {
    fn default() -> Self {
        Self::Ticks(0)
    }
}

impl ImprovementThreshold {
    /// Zero thresholds accept any touch, including a first observation.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Ticks(n) => *n == 0,
            Self::Bps(bps) => *bps <= Decimal::ZERO,
        }
    }
}

/// How windowed returns are compared against acceleration tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelComparison {
    /// LONG compares the signed return, SHORT its negation.
    #[default]
    Directional,
    /// Both sides compare the absolute return.
    Magnitude,
}

/// Acceleration multiplier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccelConfig {
    /// Sliding windows evaluated (milliseconds).
    #[serde(default = "default_windows_ms")]
    pub windows_ms: Vec<u64>,
    /// Return thresholds (fractions, e.g. 0.002 = 0.2%).
    #[serde(default)]
    pub tiers: Vec<MultiplierTier>,
    #[serde(default)]
    pub comparison: AccelComparison,
}

fn default_windows_ms() -> Vec<u64> {
    vec![1_000, 5_000, 30_000]
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            windows_ms: default_windows_ms(),
            tiers: Vec::new(),
            comparison: AccelComparison::default(),
        }
    }
}

impl AccelConfig {
    /// Longest configured window; bounds the retained price history.
    pub fn max_window_ms(&self) -> u64 {
        self.windows_ms.iter().copied().max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.windows_ms.iter().any(|w| *w == 0) {
            return Err(SignalError::ConfigError(
                "accel windows must be positive".to_string(),
            ));
        }
        validate_tiers("accel", &self.tiers)
    }
}

/// ROI multiplier configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiConfig {
    /// ROI thresholds (fractions of margin, e.g. 0.10 = 10%).
    #[serde(default)]
    pub tiers: Vec<MultiplierTier>,
}

impl RoiConfig {
    pub fn validate(&self) -> Result<()> {
        validate_tiers("roi", &self.tiers)
    }
}

/// Configuration for exit signal evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Minimum spacing between two accepted signals on one side.
    #[serde(default = "default_min_signal_interval_ms")]
    pub min_signal_interval_ms: u64,
    #[serde(default)]
    pub improvement: ImprovementThreshold,
    #[serde(default)]
    pub accel: AccelConfig,
    #[serde(default)]
    pub roi: RoiConfig,
}

fn default_min_signal_interval_ms() -> u64 {
    200
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_signal_interval_ms: default_min_signal_interval_ms(),
            improvement: ImprovementThreshold::default(),
            accel: AccelConfig::default(),
            roi: RoiConfig::default(),
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        self.accel.validate()?;
        self.roi.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ladder() -> Vec<MultiplierTier> {
        vec![
            MultiplierTier::new(dec!(0.001), dec!(1.5)),
            MultiplierTier::new(dec!(0.003), dec!(2)),
            MultiplierTier::new(dec!(0.01), dec!(4)),
        ]
    }

    #[test]
    fn test_select_tier_highest_satisfied() {
        let tiers = ladder();
        assert_eq!(select_tier(&tiers, dec!(0.0005)), None);
        assert_eq!(select_tier(&tiers, dec!(0.001)), Some(0));
        assert_eq!(select_tier(&tiers, dec!(0.005)), Some(1));
        assert_eq!(select_tier(&tiers, dec!(0.5)), Some(2));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SignalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.accel.max_window_ms(), 30_000);
        assert!(config.improvement.is_zero());
    }

    #[test]
    fn test_unsorted_tiers_rejected() {
        let mut tiers = ladder();
        tiers.swap(0, 2);
        let config = RoiConfig { tiers };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = AccelConfig {
            windows_ms: vec![0, 1_000],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_from_toml() {
        let raw = r#"
            min_signal_interval_ms = 150
            improvement = { bps = "1.5" }

            [accel]
            windows_ms = [1000, 5000]
            comparison = "magnitude"
            tiers = [
                { threshold = "0.002", multiplier = "2" },
                { threshold = "0.005", multiplier = "3" },
            ]
        "#;
        let config: SignalConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.min_signal_interval_ms, 150);
        assert_eq!(config.improvement, ImprovementThreshold::Bps(dec!(1.5)));
        assert_eq!(config.accel.comparison, AccelComparison::Magnitude);
        assert_eq!(config.accel.tiers.len(), 2);
        assert!(config.roi.tiers.is_empty());
    }
}
