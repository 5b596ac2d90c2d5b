//! Exchange gateway abstraction.
//!
//! The controller never talks to a transport directly. Everything it needs
//! from the exchange goes through [`ExchangeGateway`], which allows:
//! - Dependency injection for testing ([`MockGateway`])
//! - A paper gateway for replay runs
//! - Swapping the live REST client without touching the state machine

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vq_core::{
    ClientOrderId, InstrumentLimits, OrderSide, OrderStatus, OrderType, PositionSide, Price, Size,
    Symbol, TimeInForce,
};

use crate::error::GatewayError;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// Requests / Responses
// ============================================================================

/// Reduce-only order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: Symbol,
    pub position_side: PositionSide,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders.
    pub price: Option<Price>,
    pub quantity: Size,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    /// Reused verbatim when a timed-out placement is retried.
    pub client_order_id: ClientOrderId,
}

impl PlaceOrderRequest {
    #[must_use]
    pub fn post_only(&self) -> bool {
        self.time_in_force.is_post_only()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderAck {
    pub order_id: String,
    pub client_order_id: ClientOrderId,
}

/// Successful cancel outcome. An order that was already gone counts as
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyClosed,
}

/// Position side as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
    pub symbol: Symbol,
    pub side: PositionSide,
    /// Absolute quantity; zero when flat.
    pub quantity: Size,
    #[serde(default)]
    pub entry_price: Option<Price>,
    #[serde(default)]
    pub liquidation_price: Option<Price>,
    #[serde(default)]
    pub mark_price: Option<Price>,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<Decimal>,
}

impl PositionReport {
    /// A flat report for `(symbol, side)`.
    pub fn flat(symbol: Symbol, side: PositionSide) -> Self {
        Self {
            symbol,
            side,
            quantity: Size::ZERO,
            entry_price: None,
            liquidation_price: None,
            mark_price: None,
            unrealized_pnl: None,
            leverage: None,
        }
    }
}

/// Order state read back for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReport {
    pub order_id: String,
    pub status: OrderStatus,
    pub executed_qty: Size,
}

/// Exchange-side STOP_MARKET, reduce-only, mark-price triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOrderRequest {
    pub symbol: Symbol,
    pub position_side: PositionSide,
    pub stop_price: Price,
    pub client_order_id: ClientOrderId,
}

// ============================================================================
// ExchangeGateway
// ============================================================================

/// Exchange access consumed by the controllers.
pub trait ExchangeGateway: Send + Sync {
    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>>;

    fn cancel_order(
        &self,
        symbol: Symbol,
        order_id: String,
    ) -> BoxFuture<'_, GatewayResult<CancelOutcome>>;

    fn get_position(
        &self,
        symbol: Symbol,
        side: PositionSide,
    ) -> BoxFuture<'_, GatewayResult<PositionReport>>;

    fn get_instrument_limits(&self, symbol: Symbol) -> BoxFuture<'_, GatewayResult<InstrumentLimits>>;

    /// Order state for cancel-timeout reconciliation.
    fn get_order(&self, symbol: Symbol, order_id: String) -> BoxFuture<'_, GatewayResult<OrderReport>>;

    fn place_stop_order(
        &self,
        request: StopOrderRequest,
    ) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>>;
}

/// Arc wrapper for gateway trait objects.
pub type DynGateway = Arc<dyn ExchangeGateway>;

// ============================================================================
// MockGateway
// ============================================================================

/// Scripted gateway for tests.
///
/// Every call is recorded. Placement and cancel results are popped from
/// per-call scripts; an empty script means success. Placements can also be
/// made to hang forever or to panic for one instrument.
#[derive(Debug, Default)]
pub struct MockGateway {
    places: Mutex<Vec<PlaceOrderRequest>>,
    cancels: Mutex<Vec<(Symbol, String)>>,
    stops: Mutex<Vec<StopOrderRequest>>,
    order_reads: Mutex<Vec<String>>,
    /// `Err` entries fail the call; `Ok(())` acks with an auto ID.
    place_script: Mutex<VecDeque<GatewayResult<()>>>,
    cancel_script: Mutex<VecDeque<GatewayResult<CancelOutcome>>>,
    order_reports: Mutex<HashMap<String, GatewayResult<OrderReport>>>,
    positions: Mutex<HashMap<(Symbol, PositionSide), PositionReport>>,
    limits: Mutex<HashMap<Symbol, InstrumentLimits>>,
    stall_places: AtomicBool,
    panic_symbol: Mutex<Option<Symbol>>,
    next_id: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limits(&self, symbol: Symbol, limits: InstrumentLimits) {
        self.limits.lock().insert(symbol, limits);
    }

    pub fn set_position(&self, report: PositionReport) {
        self.positions
            .lock()
            .insert((report.symbol.clone(), report.side), report);
    }

    /// Queue the result of the next placement.
    pub fn push_place_result(&self, result: GatewayResult<()>) {
        self.place_script.lock().push_back(result);
    }

    /// Queue the result of the next cancel.
    pub fn push_cancel_result(&self, result: GatewayResult<CancelOutcome>) {
        self.cancel_script.lock().push_back(result);
    }

    /// Recorded placements never complete.
    pub fn stall_places(&self) {
        self.stall_places.store(true, Ordering::SeqCst);
    }

    /// Placements for `symbol` panic before being recorded.
    pub fn panic_on_place(&self, symbol: Symbol) {
        *self.panic_symbol.lock() = Some(symbol);
    }

    pub fn set_order_report(&self, order_id: &str, report: GatewayResult<OrderReport>) {
        self.order_reports
            .lock()
            .insert(order_id.to_string(), report);
    }

    pub fn placed(&self) -> Vec<PlaceOrderRequest> {
        self.places.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<(Symbol, String)> {
        self.cancels.lock().clone()
    }

    pub fn stops(&self) -> Vec<StopOrderRequest> {
        self.stops.lock().clone()
    }

    pub fn order_reads(&self) -> Vec<String> {
        self.order_reads.lock().clone()
    }

    fn next_order_id(&self) -> String {
        format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl ExchangeGateway for MockGateway {
    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>> {
        Box::pin(async move {
            let panics = self.panic_symbol.lock().as_ref() == Some(&request.symbol);
            if panics {
                panic!("mock gateway: placement for {} panicked", request.symbol);
            }
            let client_order_id = request.client_order_id.clone();
            self.places.lock().push(request);
            if self.stall_places.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let scripted = self.place_script.lock().pop_front().unwrap_or(Ok(()));
            scripted.map(|()| PlaceOrderAck {
                order_id: self.next_order_id(),
                client_order_id,
            })
        })
    }

    fn cancel_order(
        &self,
        symbol: Symbol,
        order_id: String,
    ) -> BoxFuture<'_, GatewayResult<CancelOutcome>> {
        Box::pin(async move {
            self.cancels.lock().push((symbol, order_id));
            self.cancel_script
                .lock()
                .pop_front()
                .unwrap_or(Ok(CancelOutcome::Cancelled))
        })
    }

    fn get_position(
        &self,
        symbol: Symbol,
        side: PositionSide,
    ) -> BoxFuture<'_, GatewayResult<PositionReport>> {
        Box::pin(async move {
            let report = self
                .positions
                .lock()
                .get(&(symbol.clone(), side))
                .cloned();
            Ok(report.unwrap_or_else(|| PositionReport::flat(symbol, side)))
        })
    }

    fn get_instrument_limits(&self, symbol: Symbol) -> BoxFuture<'_, GatewayResult<InstrumentLimits>> {
        Box::pin(async move {
            self.limits
                .lock()
                .get(&symbol)
                .copied()
                .ok_or_else(|| GatewayError::Rejected(format!("unknown symbol {symbol}")))
        })
    }

    fn get_order(&self, _symbol: Symbol, order_id: String) -> BoxFuture<'_, GatewayResult<OrderReport>> {
        Box::pin(async move {
            self.order_reads.lock().push(order_id.clone());
            self.order_reports
                .lock()
                .get(&order_id)
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::Rejected(format!("unknown order {order_id}"))))
        })
    }

    fn place_stop_order(
        &self,
        request: StopOrderRequest,
    ) -> BoxFuture<'_, GatewayResult<PlaceOrderAck>> {
        Box::pin(async move {
            let client_order_id = request.client_order_id.clone();
            self.stops.lock().push(request);
            Ok(PlaceOrderAck {
                order_id: self.next_order_id(),
                client_order_id,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: Symbol::from("BTC/USDT:USDT"),
            position_side: PositionSide::Long,
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: Some(Price::new(dec!(100))),
            quantity: Size::new(dec!(0.05)),
            time_in_force: TimeInForce::PostOnly,
            reduce_only: true,
            client_order_id: ClientOrderId::new(PositionSide::Long),
        }
    }

    #[tokio::test]
    async fn test_mock_place_follows_script() {
        let gw = MockGateway::new();
        gw.push_place_result(Err(GatewayError::Rejected("would cross".into())));

        let first = gw.place_order(request()).await;
        assert_eq!(first, Err(GatewayError::Rejected("would cross".into())));

        let second = gw.place_order(request()).await.unwrap();
        assert_eq!(second.order_id, "mock-1");
        assert_eq!(gw.placed().len(), 2);
        assert!(gw.placed()[0].post_only());
    }

    #[tokio::test]
    async fn test_mock_position_defaults_flat() {
        let gw = MockGateway::new();
        let report = gw
            .get_position(Symbol::from("ETH/USDT:USDT"), PositionSide::Short)
            .await
            .unwrap();
        assert!(report.quantity.is_zero());
    }

    #[tokio::test]
    async fn test_mock_cancel_defaults_to_success() {
        let gw = MockGateway::new();
        gw.push_cancel_result(Err(GatewayError::Timeout));
        let sym = Symbol::from("BTC/USDT:USDT");
        assert_eq!(
            gw.cancel_order(sym.clone(), "1".into()).await,
            Err(GatewayError::Timeout)
        );
        assert_eq!(
            gw.cancel_order(sym, "1".into()).await,
            Ok(CancelOutcome::Cancelled)
        );
    }
}
