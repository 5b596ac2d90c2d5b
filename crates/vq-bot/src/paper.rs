//! Paper exchange.
//!
//! In-process [`ExchangeGateway`] for replay runs. Resting reduce-only
//! limits fill in full at their limit price when the replayed market
//! trades or quotes through them. Fills and closes are queued as
//! [`OrderEvent`]s and drained by the run loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};
use vq_core::{
    ControllerKey, InstrumentLimits, MarketEvent, OrderEvent, OrderSide, OrderStatus,
    PositionSide, Price, Size, Symbol,
};
use vq_executor::{
    BoxFuture, CancelOutcome, ExchangeGateway, GatewayError, GatewayResult, OrderReport,
    PlaceOrderAck, PlaceOrderRequest, PositionReport, StopOrderRequest,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    request: PlaceOrderRequest,
    status: OrderStatus,
    executed_qty: Size,
}

impl PaperOrder {
    fn key(&self) -> ControllerKey {
        ControllerKey::new(self.request.symbol.clone(), self.request.position_side)
    }

    /// Limit price reached by a quote or print at `bid` / `ask`.
    fn crossed(&self, bid: Price, ask: Price) -> bool {
        let Some(price) = self.request.price else {
            return true;
        };
        match self.request.side {
            OrderSide::Sell => bid.is_positive() && bid >= price,
            OrderSide::Buy => ask.is_positive() && ask <= price,
        }
    }
}

#[derive(Debug, Default)]
struct PaperBook {
    limits: HashMap<Symbol, InstrumentLimits>,
    touch: HashMap<Symbol, (Price, Price)>,
    positions: HashMap<(Symbol, PositionSide), PositionReport>,
    orders: HashMap<String, PaperOrder>,
    stops: HashMap<String, StopOrderRequest>,
    outbox: Vec<OrderEvent>,
    /// Time of the last replayed market event.
    now_ms: u64,
}

impl PaperBook {
    fn position_qty(&self, symbol: &Symbol, side: PositionSide) -> Size {
        self.positions
            .get(&(symbol.clone(), side))
            .map_or(Size::ZERO, |p| p.quantity)
    }

    /// Quantity already committed by open orders on the same side.
    fn resting_qty(&self, symbol: &Symbol, side: PositionSide) -> Size {
        let total = self
            .orders
            .values()
            .filter(|o| {
                o.status.is_open() && &o.request.symbol == symbol && o.request.position_side == side
            })
            .map(|o| o.request.quantity.inner())
            .sum();
        Size::new(total)
    }

    fn fill(&mut self, order_id: &str, fill_seq: u64, now_ms: u64) {
        let Some(order) = self.orders.get_mut(order_id) else {
            return;
        };
        if !order.status.is_open() {
            return;
        }
        let qty = order.request.quantity.saturating_sub(order.executed_qty);
        let price = order.request.price.unwrap_or(Price::ZERO);
        order.executed_qty = order.request.quantity;
        order.status = OrderStatus::Filled;
        let key = order.key();

        if let Some(position) = self.positions.get_mut(&(key.symbol.clone(), key.side)) {
            position.quantity = position.quantity.saturating_sub(qty);
        }
        info!(%key, order_id, %qty, %price, "Paper fill");
        self.outbox.push(OrderEvent::fill(
            &key,
            order_id,
            format!("paper-fill-{fill_seq}"),
            qty,
            price,
            now_ms,
        ));
    }
}

/// Replay-driven exchange simulator.
#[derive(Debug, Default)]
pub struct PaperGateway {
    book: Mutex<PaperBook>,
    next_id: AtomicU64,
    next_fill: AtomicU64,
}

impl PaperGateway {
    pub fn new(limits: impl IntoIterator<Item = (Symbol, InstrumentLimits)>) -> Self {
        let gateway = Self::default();
        gateway.book.lock().limits.extend(limits);
        gateway
    }

    /// Replace the position the exchange reports for one side.
    pub fn set_position(&self, report: PositionReport) {
        self.book
            .lock()
            .positions
            .insert((report.symbol.clone(), report.side), report);
    }

    pub fn position(&self, symbol: &Symbol, side: PositionSide) -> Size {
        self.book.lock().position_qty(symbol, side)
    }

    pub fn open_orders(&self) -> usize {
        self.book
            .lock()
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.book.lock().stops.len()
    }

    /// Match resting orders against a replayed market event.
    pub fn on_market(&self, event: &MarketEvent, now_ms: u64) {
        let mut book = self.book.lock();
        book.now_ms = book.now_ms.max(now_ms);
        let (bid, ask) = match event {
            MarketEvent::BookTicker(b) => {
                if !b.is_valid() {
                    return;
                }
                book.touch.insert(b.symbol.clone(), (b.bid, b.ask));
                (b.bid, b.ask)
            }
            // a print through the limit fills either side
            MarketEvent::Trade(t) => (t.price, t.price),
        };

        let mut crossed: Vec<String> = book
            .orders
            .iter()
            .filter(|(_, o)| {
                o.status.is_open() && &o.request.symbol == event.symbol() && o.crossed(bid, ask)
            })
            .map(|(id, _)| id.clone())
            .collect();
        crossed.sort();
        for order_id in crossed {
            let seq = self.next_fill.fetch_add(1, Ordering::SeqCst) + 1;
            book.fill(&order_id, seq, now_ms);
        }
    }

    /// Take queued order events.
    pub fn drain_events(&self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.book.lock().outbox)
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl ExchangeGateway for PaperGateway {
    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>> {
        Box::pin(async move {
            let mut book = self.book.lock();
            if !book.limits.contains_key(&request.symbol) {
                return Err(GatewayError::Rejected(format!(
                    "unknown symbol {}",
                    request.symbol
                )));
            }
            if request.reduce_only {
                let open = book.position_qty(&request.symbol, request.position_side);
                let committed = book.resting_qty(&request.symbol, request.position_side);
                if committed.inner() + request.quantity.inner() > open.inner() {
                    return Err(GatewayError::Rejected(
                        "reduce-only order would increase position".to_string(),
                    ));
                }
            }
            if request.post_only() {
                if let (Some(price), Some(&(bid, ask))) =
                    (request.price, book.touch.get(&request.symbol))
                {
                    let crosses = match request.side {
                        OrderSide::Sell => price <= bid,
                        OrderSide::Buy => price >= ask,
                    };
                    if crosses {
                        return Err(GatewayError::Rejected(
                            "post-only order would cross".to_string(),
                        ));
                    }
                }
            }

            let order_id = self.next_order_id();
            let ack = PlaceOrderAck {
                order_id: order_id.clone(),
                client_order_id: request.client_order_id.clone(),
            };
            debug!(%order_id, symbol = %request.symbol, qty = %request.quantity, "Paper order accepted");
            let order = PaperOrder {
                request,
                status: OrderStatus::New,
                executed_qty: Size::ZERO,
            };
            let touch = book.touch.get(&order.request.symbol).copied();
            book.orders.insert(order_id.clone(), order);

            // marketable non-post-only limits take liquidity at once
            if let Some((bid, ask)) = touch {
                if book.orders.get(&order_id).is_some_and(|o| o.crossed(bid, ask)) {
                    let seq = self.next_fill.fetch_add(1, Ordering::SeqCst) + 1;
                    let now_ms = book.now_ms;
                    book.fill(&order_id, seq, now_ms);
                }
            }
            Ok(ack)
        })
    }

    fn cancel_order(
        &self,
        symbol: Symbol,
        order_id: String,
    ) -> BoxFuture<'_, GatewayResult<CancelOutcome>> {
        Box::pin(async move {
            let mut book = self.book.lock();
            if book.stops.remove(&order_id).is_some() {
                return Ok(CancelOutcome::Cancelled);
            }
            let Some(order) = book.orders.get_mut(&order_id) else {
                return Err(GatewayError::Rejected(format!(
                    "unknown order {order_id} on {symbol}"
                )));
            };
            if !order.status.is_open() {
                return Ok(CancelOutcome::AlreadyClosed);
            }
            order.status = OrderStatus::Canceled;
            let key = order.key();
            let now_ms = book.now_ms;
            book.outbox
                .push(OrderEvent::closed(&key, order_id, OrderStatus::Canceled, now_ms));
            Ok(CancelOutcome::Cancelled)
        })
    }

    fn get_position(
        &self,
        symbol: Symbol,
        side: PositionSide,
    ) -> BoxFuture<'_, GatewayResult<PositionReport>> {
        Box::pin(async move {
            let report = self.book.lock().positions.get(&(symbol.clone(), side)).cloned();
            Ok(report.unwrap_or_else(|| PositionReport::flat(symbol, side)))
        })
    }

    fn get_instrument_limits(&self, symbol: Symbol) -> BoxFuture<'_, GatewayResult<InstrumentLimits>> {
        Box::pin(async move {
            self.book
                .lock()
                .limits
                .get(&symbol)
                .copied()
                .ok_or_else(|| GatewayError::Rejected(format!("unknown symbol {symbol}")))
        })
    }

    fn get_order(&self, _symbol: Symbol, order_id: String) -> BoxFuture<'_, GatewayResult<OrderReport>> {
        Box::pin(async move {
            self.book
                .lock()
                .orders
                .get(&order_id)
                .map(|o| OrderReport {
                    order_id: order_id.clone(),
                    status: o.status,
                    executed_qty: o.executed_qty,
                })
                .ok_or_else(|| GatewayError::Rejected(format!("unknown order {order_id}")))
        })
    }

    fn place_stop_order(
        &self,
        request: StopOrderRequest,
    ) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>> {
        Box::pin(async move {
            let order_id = self.next_order_id();
            let ack = PlaceOrderAck {
                order_id: order_id.clone(),
                client_order_id: request.client_order_id.clone(),
            };
            info!(%order_id, symbol = %request.symbol, stop = %request.stop_price, "Paper protective stop");
            self.book.lock().stops.insert(order_id, request);
            Ok(ack)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vq_core::{BookTicker, ClientOrderId, OrderEventKind, OrderType, TimeInForce, Trade};

    const SYM: &str = "BTC/USDT:USDT";

    fn gateway() -> PaperGateway {
        let gw = PaperGateway::new([(
            Symbol::from(SYM),
            InstrumentLimits::new(
                Size::new(dec!(0.001)),
                Size::new(dec!(0.001)),
                Price::new(dec!(0.1)),
            )
            .unwrap(),
        )]);
        let mut report = PositionReport::flat(Symbol::from(SYM), PositionSide::Long);
        report.quantity = Size::new(dec!(1));
        gw.set_position(report);
        gw
    }

    fn book(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> MarketEvent {
        MarketEvent::BookTicker(BookTicker {
            symbol: Symbol::from(SYM),
            bid: Price::new(bid),
            ask: Price::new(ask),
            time_ms: 1,
        })
    }

    fn sell(price: rust_decimal::Decimal, qty: rust_decimal::Decimal, tif: TimeInForce) -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: Symbol::from(SYM),
            position_side: PositionSide::Long,
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: Some(Price::new(price)),
            quantity: Size::new(qty),
            time_in_force: tif,
            reduce_only: true,
            client_order_id: ClientOrderId::new(PositionSide::Long),
        }
    }

    #[tokio::test]
    async fn test_resting_sell_fills_when_bid_reaches_price() {
        let gw = gateway();
        gw.on_market(&book(dec!(100), dec!(100.1)), 1);
        let ack = gw
            .place_order(sell(dec!(100.1), dec!(0.4), TimeInForce::PostOnly))
            .await
            .unwrap();
        assert_eq!(gw.open_orders(), 1);

        gw.on_market(&book(dec!(100.1), dec!(100.2)), 2);
        let events = gw.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].order_id, ack.order_id);
        assert!(matches!(events[0].kind, OrderEventKind::Fill { quantity, .. } if quantity == Size::new(dec!(0.4))));
        assert_eq!(
            gw.position(&Symbol::from(SYM), PositionSide::Long),
            Size::new(dec!(0.6))
        );

        let report = gw
            .get_order(Symbol::from(SYM), ack.order_id)
            .await
            .unwrap();
        assert_eq!(report.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_trade_through_fills() {
        let gw = gateway();
        gw.place_order(sell(dec!(101), dec!(0.1), TimeInForce::GoodTilCancelled))
            .await
            .unwrap();
        gw.on_market(
            &MarketEvent::Trade(Trade {
                symbol: Symbol::from(SYM),
                price: Price::new(dec!(101.2)),
                time_ms: 3,
            }),
            3,
        );
        assert_eq!(gw.drain_events().len(), 1);
        assert_eq!(gw.open_orders(), 0);
    }

    #[tokio::test]
    async fn test_post_only_cross_rejected() {
        let gw = gateway();
        gw.on_market(&book(dec!(100), dec!(100.1)), 1);
        let err = gw
            .place_order(sell(dec!(100), dec!(0.1), TimeInForce::PostOnly))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_marketable_limit_fills_on_placement() {
        let gw = gateway();
        gw.on_market(&book(dec!(100), dec!(100.1)), 1);
        gw.place_order(sell(dec!(99.9), dec!(0.2), TimeInForce::GoodTilCancelled))
            .await
            .unwrap();
        assert_eq!(gw.drain_events().len(), 1);
        assert_eq!(
            gw.position(&Symbol::from(SYM), PositionSide::Long),
            Size::new(dec!(0.8))
        );
    }

    #[tokio::test]
    async fn test_reduce_only_cannot_exceed_position() {
        let gw = gateway();
        gw.place_order(sell(dec!(105), dec!(0.7), TimeInForce::GoodTilCancelled))
            .await
            .unwrap();
        let err = gw
            .place_order(sell(dec!(105), dec!(0.4), TimeInForce::GoodTilCancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_cancel_lifecycle() {
        let gw = gateway();
        let ack = gw
            .place_order(sell(dec!(105), dec!(0.1), TimeInForce::GoodTilCancelled))
            .await
            .unwrap();
        let first = gw
            .cancel_order(Symbol::from(SYM), ack.order_id.clone())
            .await
            .unwrap();
        assert_eq!(first, CancelOutcome::Cancelled);
        let second = gw
            .cancel_order(Symbol::from(SYM), ack.order_id)
            .await
            .unwrap();
        assert_eq!(second, CancelOutcome::AlreadyClosed);
        assert_eq!(gw.drain_events().len(), 1);
        assert!(gw
            .cancel_order(Symbol::from(SYM), "missing".to_string())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stop_orders_tracked_and_cancelled() {
        let gw = gateway();
        let ack = gw
            .place_stop_order(StopOrderRequest {
                symbol: Symbol::from(SYM),
                position_side: PositionSide::Long,
                stop_price: Price::new(dec!(90)),
                client_order_id: ClientOrderId::new(PositionSide::Long),
            })
            .await
            .unwrap();
        assert_eq!(gw.stop_count(), 1);
        gw.cancel_order(Symbol::from(SYM), ack.order_id)
            .await
            .unwrap();
        assert_eq!(gw.stop_count(), 0);
    }
}
