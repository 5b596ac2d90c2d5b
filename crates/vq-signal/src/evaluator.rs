//! Exit signal evaluator.
//!
//! Strategy: exit a side into flow that is moving in its favour.
//! - LONG: `last > prev && bid >= last`, or the bid stepping up through
//!   the previous print (`bid >= last && bid > prev`) by the configured
//!   improvement over the previous bid.
//! - SHORT: mirror with `<`, the ask, and ask improvement.
//!
//! Evaluation reads only the snapshot and configuration, so identical
//! snapshots always produce identical results.

use rust_decimal::Decimal;
use vq_core::{PositionSide, Price};
use vq_feed::MarketSnapshot;

use crate::config::{select_tier, AccelComparison, AccelConfig, ImprovementThreshold, SignalConfig};
use crate::signal::{AccelReading, SignalReason, SignalResult};

/// Evaluate the exit condition for `side`.
///
/// Not triggered when the snapshot is not ready (book plus two positive
/// trades) or holds fewer than two history points.
pub fn evaluate(
    snapshot: &MarketSnapshot,
    side: PositionSide,
    config: &SignalConfig,
    tick_size: Price,
) -> SignalResult {
    if snapshot.history_len() < 2 || !snapshot.is_ready() {
        return SignalResult::idle();
    }

    // is_ready guarantees all four are present
    let (Some(last), Some(prev), Some(bid), Some(ask)) = (
        snapshot.last_trade_price,
        snapshot.prev_trade_price,
        snapshot.best_bid,
        snapshot.best_ask,
    ) else {
        return SignalResult::idle();
    };

    let reason = match side {
        PositionSide::Long => {
            if last > prev && bid >= last {
                Some(SignalReason::LongPrimary)
            } else if bid >= last
                && bid > prev
                && improved(
                    bid,
                    snapshot.prev_best_bid,
                    &config.improvement,
                    tick_size,
                    true,
                )
            {
                Some(SignalReason::LongBidImprove)
            } else {
                None
            }
        }
        PositionSide::Short => {
            if last < prev && ask <= last {
                Some(SignalReason::ShortPrimary)
            } else if ask <= last
                && ask < prev
                && improved(
                    ask,
                    snapshot.prev_best_ask,
                    &config.improvement,
                    tick_size,
                    false,
                )
            {
                Some(SignalReason::ShortAskImprove)
            } else {
                None
            }
        }
    };

    let (acceleration_mult, accel) = acceleration(snapshot, side, &config.accel);
    SignalResult {
        triggered: reason.is_some(),
        reason,
        acceleration_mult,
        accel,
    }
}

/// Touch moved by at least the configured improvement in the exit's
/// favour (`upward` for a bid, downward for an ask).
fn improved(
    current: Price,
    previous: Option<Price>,
    threshold: &ImprovementThreshold,
    tick_size: Price,
    upward: bool,
) -> bool {
    if threshold.is_zero() {
        return true;
    }
    let Some(previous) = previous else {
        return false;
    };
    let delta = if upward {
        current.inner() - previous.inner()
    } else {
        previous.inner() - current.inner()
    };
    match threshold {
        ImprovementThreshold::Ticks(n) => delta >= tick_size.inner() * Decimal::from(*n),
        ImprovementThreshold::Bps(bps) => {
            if !previous.is_positive() {
                return false;
            }
            delta / previous.inner() * Decimal::from(10_000) >= *bps
        }
    }
}

/// Acceleration multiplier for `side`.
///
/// Each window's return is compared per [`AccelComparison`]; the window
/// reaching the highest tier wins, the larger window on a tie. Returns a
/// multiplier of 1 when no tier is satisfied or history is too short.
pub fn acceleration(
    snapshot: &MarketSnapshot,
    side: PositionSide,
    config: &AccelConfig,
) -> (Decimal, Option<AccelReading>) {
    if config.tiers.is_empty() || snapshot.history_len() < 2 {
        return (Decimal::ONE, None);
    }

    let mut best: Option<AccelReading> = None;
    for &window_ms in &config.windows_ms {
        let Some(ret) = snapshot.window_return(window_ms) else {
            continue;
        };
        let compared = match (config.comparison, side) {
            (AccelComparison::Directional, PositionSide::Long) => ret,
            (AccelComparison::Directional, PositionSide::Short) => -ret,
            (AccelComparison::Magnitude, _) => ret.abs(),
        };
        let Some(tier) = select_tier(&config.tiers, compared) else {
            continue;
        };
        let wins = match &best {
            None => true,
            Some(b) => tier > b.tier || (tier == b.tier && window_ms > b.window_ms),
        };
        if wins {
            best = Some(AccelReading {
                window_ms,
                window_return: ret,
                tier,
            });
        }
    }

    let mult = best
        .map(|b| config.tiers[b.tier].multiplier.max(Decimal::ONE))
        .unwrap_or(Decimal::ONE);
    (mult, best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiplierTier;
    use rust_decimal_macros::dec;
    use vq_core::{BookTicker, Symbol, Trade};

    fn sym() -> Symbol {
        Symbol::from("BTCUSDT")
    }

    fn tick() -> Price {
        Price::new(dec!(0.1))
    }

    fn snap_with(trades: &[(Decimal, u64)], books: &[(Decimal, Decimal)]) -> MarketSnapshot {
        let mut s = MarketSnapshot::new(sym(), 30_000);
        for (i, (bid, ask)) in books.iter().enumerate() {
            s.apply_book(
                &BookTicker {
                    symbol: sym(),
                    bid: Price::new(*bid),
                    ask: Price::new(*ask),
                    time_ms: i as u64,
                },
                0,
            )
            .unwrap();
        }
        for (price, t) in trades {
            s.apply_trade(
                &Trade {
                    symbol: sym(),
                    price: Price::new(*price),
                    time_ms: *t,
                },
                *t,
            )
            .unwrap();
        }
        s
    }

    fn accel_config(comparison: AccelComparison) -> AccelConfig {
        AccelConfig {
            windows_ms: vec![1_000, 5_000, 30_000],
            tiers: vec![
                MultiplierTier::new(dec!(0.001), dec!(2)),
                MultiplierTier::new(dec!(0.005), dec!(3)),
            ],
            comparison,
        }
    }

    #[test]
    fn test_fewer_than_two_points_never_triggers() {
        let s = snap_with(&[(dec!(100), 0)], &[(dec!(100), dec!(100.1))]);
        for side in PositionSide::BOTH {
            let r = evaluate(&s, side, &SignalConfig::default(), tick());
            assert!(!r.triggered);
            assert_eq!(r.acceleration_mult, dec!(1));
        }
    }

    #[test]
    fn test_not_ready_without_book() {
        let s = snap_with(&[(dec!(100), 0), (dec!(101), 1)], &[]);
        let r = evaluate(&s, PositionSide::Long, &SignalConfig::default(), tick());
        assert!(!r.triggered);
    }

    #[test]
    fn test_long_primary() {
        // uptick, bid holds at the print
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100.5), 1)],
            &[(dec!(100.5), dec!(100.6))],
        );
        let r = evaluate(&s, PositionSide::Long, &SignalConfig::default(), tick());
        assert!(r.triggered);
        assert_eq!(r.reason, Some(SignalReason::LongPrimary));

        let r = evaluate(&s, PositionSide::Short, &SignalConfig::default(), tick());
        assert!(!r.triggered);
    }

    #[test]
    fn test_long_requires_bid_confirmation() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100.5), 1)],
            &[(dec!(100.4), dec!(100.6))],
        );
        let r = evaluate(&s, PositionSide::Long, &SignalConfig::default(), tick());
        assert!(!r.triggered);
    }

    #[test]
    fn test_long_bid_improve() {
        // flat prints, bid lifted through them
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100), 1)],
            &[(dec!(99.9), dec!(100.1)), (dec!(100.1), dec!(100.2))],
        );
        let r = evaluate(&s, PositionSide::Long, &SignalConfig::default(), tick());
        assert_eq!(r.reason, Some(SignalReason::LongBidImprove));
    }

    #[test]
    fn test_bid_improve_respects_tick_threshold() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100), 1)],
            &[(dec!(99.9), dec!(100.1)), (dec!(100.1), dec!(100.2))],
        );
        let mut config = SignalConfig {
            improvement: ImprovementThreshold::Ticks(2),
            ..Default::default()
        };
        // improved by exactly 2 ticks
        assert!(evaluate(&s, PositionSide::Long, &config, tick()).triggered);

        config.improvement = ImprovementThreshold::Ticks(3);
        assert!(!evaluate(&s, PositionSide::Long, &config, tick()).triggered);
    }

    #[test]
    fn test_ask_improve_respects_bps_threshold() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100), 1)],
            &[(dec!(99.8), dec!(100)), (dec!(99.8), dec!(99.9))],
        );
        // ask moved 100 -> 99.9 = 10 bps
        let mut config = SignalConfig {
            improvement: ImprovementThreshold::Bps(dec!(10)),
            ..Default::default()
        };
        let r = evaluate(&s, PositionSide::Short, &config, tick());
        assert_eq!(r.reason, Some(SignalReason::ShortAskImprove));

        config.improvement = ImprovementThreshold::Bps(dec!(11));
        assert!(!evaluate(&s, PositionSide::Short, &config, tick()).triggered);
    }

    #[test]
    fn test_short_primary() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(99.5), 1)],
            &[(dec!(99.4), dec!(99.5))],
        );
        let r = evaluate(&s, PositionSide::Short, &SignalConfig::default(), tick());
        assert_eq!(r.reason, Some(SignalReason::ShortPrimary));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100.5), 1)],
            &[(dec!(100.5), dec!(100.6))],
        );
        let config = SignalConfig::default();
        let a = evaluate(&s, PositionSide::Long, &config, tick());
        let b = evaluate(&s, PositionSide::Long, &config, tick());
        assert_eq!(a, b);
    }

    #[test]
    fn test_acceleration_directional() {
        // +0.6% over ~4s, +0.2% over the last second
        let s = snap_with(
            &[(dec!(100), 0), (dec!(100.4), 4_100), (dec!(100.6), 4_500)],
            &[(dec!(100.6), dec!(100.7))],
        );
        let config = accel_config(AccelComparison::Directional);

        let (mult, reading) = acceleration(&s, PositionSide::Long, &config);
        assert_eq!(mult, dec!(3));
        let reading = reading.unwrap();
        assert_eq!(reading.tier, 1);
        // 5s and 30s windows both reach tier 1; larger window wins
        assert_eq!(reading.window_ms, 30_000);

        // rising market does not accelerate a SHORT exit
        let (mult, reading) = acceleration(&s, PositionSide::Short, &config);
        assert_eq!(mult, dec!(1));
        assert!(reading.is_none());
    }

    #[test]
    fn test_acceleration_magnitude_is_side_agnostic() {
        let s = snap_with(
            &[(dec!(100), 0), (dec!(99.8), 500)],
            &[(dec!(99.7), dec!(99.8))],
        );
        let config = accel_config(AccelComparison::Magnitude);
        let (long_mult, _) = acceleration(&s, PositionSide::Long, &config);
        let (short_mult, _) = acceleration(&s, PositionSide::Short, &config);
        assert_eq!(long_mult, dec!(2));
        assert_eq!(short_mult, dec!(2));
    }

    #[test]
    fn test_acceleration_multiplier_floor_is_one() {
        let s = snap_with(&[(dec!(100), 0), (dec!(101), 500)], &[]);
        let config = AccelConfig {
            tiers: vec![MultiplierTier::new(dec!(0.001), dec!(0.5))],
            ..accel_config(AccelComparison::Directional)
        };
        let (mult, reading) = acceleration(&s, PositionSide::Long, &config);
        assert_eq!(mult, dec!(1));
        assert!(reading.is_some());
    }
}
