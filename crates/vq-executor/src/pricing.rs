//! Limit price per execution mode.
//!
//! - MAKER_ONLY: closing-side touch, optionally stepped inside the spread,
//!   kept at least `maker_safety_ticks` from the opposite touch and
//!   rounded passively (sell up, buy down). Post-only.
//! - AGGRESSIVE_LIMIT: opposite touch pushed `aggressive_offset_ticks`
//!   further, rounded aggressively. Good-til-cancelled, may cross.

use vq_core::{ExecutionMode, OrderSide, Price, TimeInForce};

use crate::config::ExecutionSettings;

/// Price and time-in-force for one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Price,
    pub time_in_force: TimeInForce,
}

/// Quote a closing order on `side`. `None` when the book is unusable.
pub fn quote(
    mode: ExecutionMode,
    side: OrderSide,
    bid: Price,
    ask: Price,
    tick: Price,
    settings: &ExecutionSettings,
) -> Option<Quote> {
    if !bid.is_positive() || !ask.is_positive() || bid > ask || !tick.is_positive() {
        return None;
    }
    let (price, time_in_force) = match mode {
        ExecutionMode::MakerOnly => (maker_price(side, bid, ask, tick, settings), TimeInForce::PostOnly),
        ExecutionMode::AggressiveLimit => (
            aggressive_price(side, bid, ask, tick, settings.aggressive_offset_ticks),
            TimeInForce::GoodTilCancelled,
        ),
    };
    price.is_positive().then_some(Quote {
        price,
        time_in_force,
    })
}

fn maker_price(side: OrderSide, bid: Price, ask: Price, tick: Price, settings: &ExecutionSettings) -> Price {
    let inside = i64::from(settings.maker_inside_ticks());
    let safety = i64::from(settings.effective_safety_ticks());
    match side {
        OrderSide::Sell => {
            let floor = bid.offset_ticks(tick, safety);
            ask.offset_ticks(tick, -inside)
                .max(floor)
                .round_up_to_tick(tick)
        }
        OrderSide::Buy => {
            let ceiling = ask.offset_ticks(tick, -safety);
            bid.offset_ticks(tick, inside)
                .min(ceiling)
                .round_to_tick(tick)
        }
    }
}

fn aggressive_price(side: OrderSide, bid: Price, ask: Price, tick: Price, offset: u32) -> Price {
    let offset = i64::from(offset);
    match side {
        OrderSide::Sell => bid.offset_ticks(tick, -offset).round_to_tick(tick),
        OrderSide::Buy => ask.offset_ticks(tick, offset).round_up_to_tick(tick),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MakerPriceMode;
    use rust_decimal_macros::dec;

    fn px(d: rust_decimal::Decimal) -> Price {
        Price::new(d)
    }

    fn tick() -> Price {
        px(dec!(0.1))
    }

    #[test]
    fn test_maker_at_touch() {
        let s = ExecutionSettings::default();
        let sell = quote(ExecutionMode::MakerOnly, OrderSide::Sell, px(dec!(100)), px(dec!(100.5)), tick(), &s)
            .unwrap();
        assert_eq!(sell.price, px(dec!(100.5)));
        assert!(sell.time_in_force.is_post_only());

        let buy = quote(ExecutionMode::MakerOnly, OrderSide::Buy, px(dec!(100)), px(dec!(100.5)), tick(), &s)
            .unwrap();
        assert_eq!(buy.price, px(dec!(100)));
    }

    #[test]
    fn test_maker_inside_spread_respects_safety() {
        let s = ExecutionSettings {
            maker_price_mode: MakerPriceMode::CustomTicks,
            maker_n_ticks: 10,
            maker_safety_ticks: 2,
            ..Default::default()
        };
        // ask 100.5 - 10 ticks = 99.5, floored at bid + 2 ticks = 100.2
        let sell = quote(ExecutionMode::MakerOnly, OrderSide::Sell, px(dec!(100)), px(dec!(100.5)), tick(), &s)
            .unwrap();
        assert_eq!(sell.price, px(dec!(100.2)));

        let buy = quote(ExecutionMode::MakerOnly, OrderSide::Buy, px(dec!(100)), px(dec!(100.5)), tick(), &s)
            .unwrap();
        assert_eq!(buy.price, px(dec!(100.3)));
    }

    #[test]
    fn test_maker_one_tick_spread_stays_passive() {
        let s = ExecutionSettings {
            maker_price_mode: MakerPriceMode::InsideSpread1Tick,
            ..Default::default()
        };
        let sell = quote(ExecutionMode::MakerOnly, OrderSide::Sell, px(dec!(100)), px(dec!(100.1)), tick(), &s)
            .unwrap();
        assert_eq!(sell.price, px(dec!(100.1)));
    }

    #[test]
    fn test_aggressive_crosses_by_offset() {
        let s = ExecutionSettings {
            aggressive_offset_ticks: 2,
            ..Default::default()
        };
        let sell = quote(
            ExecutionMode::AggressiveLimit,
            OrderSide::Sell,
            px(dec!(100)),
            px(dec!(100.5)),
            tick(),
            &s,
        )
        .unwrap();
        assert_eq!(sell.price, px(dec!(99.8)));
        assert_eq!(sell.time_in_force, TimeInForce::GoodTilCancelled);

        let buy = quote(
            ExecutionMode::AggressiveLimit,
            OrderSide::Buy,
            px(dec!(100)),
            px(dec!(100.5)),
            tick(),
            &s,
        )
        .unwrap();
        assert_eq!(buy.price, px(dec!(100.7)));
    }

    #[test]
    fn test_crossed_book_not_quoted() {
        let s = ExecutionSettings::default();
        assert!(quote(ExecutionMode::MakerOnly, OrderSide::Sell, px(dec!(101)), px(dec!(100)), tick(), &s).is_none());
    }
}
