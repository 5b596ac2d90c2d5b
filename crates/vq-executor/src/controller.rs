//! Execution controller.
//!
//! Drives one (instrument, side) through the lifecycle
//! `IDLE -> PLACE -> WAIT -> (CANCEL -> COOLDOWN ->) IDLE`, ending in
//! `DONE` once the remainder rounds to zero. Every state change goes
//! through the transition table.
//!
//! The controller is driven by its worker:
//! - [`ExecutionController::poll`] on market updates and timer ticks
//!   (TTL, cooldown, dust grace and placement decisions)
//! - [`ExecutionController::on_order_event`] for fills and closes
//! - [`ExecutionController::on_position`] for gateway position reports
//!
//! Gateway calls are the only suspension points. Each one is bounded by
//! the TTL of the mode it serves; an expired call is a `Timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, trace, warn};
use vq_core::{
    ActiveOrder, ClientOrderId, ControllerKey, ExecutionMode, ExecutionState, InstrumentLimits,
    OrderEvent, OrderEventKind, OrderType, Price,
};
use vq_feed::MarketState;
use vq_risk::{ExistingStop, PositionRisk, ProtectiveStopPlanner, RiskGuard, StopAction};
use vq_signal::{compute_roi, evaluate, roi_multiplier, unrealized_pnl};
use vq_telemetry::Metrics;

use crate::config::SymbolSettings;
use crate::context::{
    ControllerStatus, FillOutcome, PositionSideContext, Reconciliation, Rotation,
};
use crate::error::{ExecutorError, ExecutorResult, GatewayError};
use crate::gateway::{
    CancelOutcome, DynGateway, GatewayResult, PlaceOrderRequest, PositionReport, StopOrderRequest,
};
use crate::pricing::quote;
use crate::sizer::{size, NotOrderable, SizeDecision};
use crate::transition::{next_state, Trigger};

/// Bound one gateway call to `limit_ms`.
async fn bounded<T>(
    limit_ms: u64,
    call: impl Future<Output = GatewayResult<T>>,
) -> GatewayResult<T> {
    tokio::time::timeout(Duration::from_millis(limit_ms), call)
        .await
        .unwrap_or(Err(GatewayError::Timeout))
}

/// Outcome of a drain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub key: ControllerKey,
    /// Order whose cancel could not be confirmed.
    pub residual_order: Option<String>,
}

pub struct ExecutionController {
    ctx: PositionSideContext,
    settings: Arc<SymbolSettings>,
    gateway: DynGateway,
    market: Arc<MarketState>,
    risk: RiskGuard,
    stop_planner: ProtectiveStopPlanner,
    protective_stop: Option<ExistingStop>,
    stopping: bool,
}

impl ExecutionController {
    pub fn new(
        key: ControllerKey,
        report: &PositionReport,
        limits: InstrumentLimits,
        settings: Arc<SymbolSettings>,
        gateway: DynGateway,
        market: Arc<MarketState>,
        risk: RiskGuard,
        now_ms: u64,
    ) -> Self {
        let ctx = PositionSideContext::new(
            key,
            report,
            limits,
            settings.signal.min_signal_interval_ms,
            now_ms,
        );
        let stop_planner = ProtectiveStopPlanner::new(settings.protective_stop.clone());
        let controller = Self {
            ctx,
            settings,
            gateway,
            market,
            risk,
            stop_planner,
            protective_stop: None,
            stopping: false,
        };
        controller.publish_remaining();
        controller
    }

    pub fn key(&self) -> &ControllerKey {
        &self.ctx.key
    }

    pub fn state(&self) -> ExecutionState {
        self.ctx.state
    }

    pub fn context(&self) -> &PositionSideContext {
        &self.ctx
    }

    pub fn status(&self) -> ControllerStatus {
        self.ctx.status()
    }

    pub fn protective_stop(&self) -> Option<&ExistingStop> {
        self.protective_stop.as_ref()
    }

    /// Swap in a new settings snapshot; takes effect on the next pass.
    pub fn update_settings(&mut self, settings: Arc<SymbolSettings>) {
        self.ctx
            .throttle
            .set_interval(settings.signal.min_signal_interval_ms);
        self.stop_planner = ProtectiveStopPlanner::new(settings.protective_stop.clone());
        self.settings = settings;
        debug!(key = %self.ctx.key, "Settings snapshot replaced");
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, trigger: Trigger, now_ms: u64) -> ExecutorResult<ExecutionState> {
        let from = self.ctx.state;
        let to = next_state(from, trigger)
            .ok_or(ExecutorError::InvalidTransition { from, trigger })?;
        self.ctx.state = to;
        self.ctx.last_action_ms = now_ms;
        debug!(
            key = %self.ctx.key,
            %from,
            %to,
            trigger = trigger.as_str(),
            mode = %self.ctx.mode,
            "State transition"
        );
        Ok(to)
    }

    fn record_rotation(&self, rotation: Option<Rotation>) {
        if let Some(r) = rotation {
            info!(
                key = %self.ctx.key,
                from = %r.from,
                to = %r.to,
                "Execution mode rotated"
            );
            Metrics::mode_rotation(r.from.as_str(), r.to.as_str());
        }
    }

    fn publish_remaining(&self) {
        Metrics::remaining_qty(
            self.ctx.key.symbol.as_str(),
            &self.ctx.key.side.to_string(),
            self.ctx.remaining.inner().to_f64().unwrap_or_default(),
        );
    }

    fn enter_cooldown(&mut self, mode: ExecutionMode, now_ms: u64) {
        self.ctx.cooldown_until_ms = now_ms + self.settings.execution.cooldown_ms(mode);
    }

    // ========================================================================
    // Poll
    // ========================================================================

    /// One scheduling pass: timers first, then a placement decision when
    /// idle.
    pub async fn poll(&mut self, now_ms: u64) -> ExecutorResult<()> {
        if self.ctx.state == ExecutionState::Done {
            return Ok(());
        }
        if self.ctx.is_complete() {
            return self.finish(Trigger::Completed, now_ms).await;
        }

        match self.ctx.state {
            ExecutionState::Cooldown => {
                if now_ms < self.ctx.cooldown_until_ms {
                    return Ok(());
                }
                self.transition(Trigger::CooldownElapsed, now_ms)?;
            }
            ExecutionState::Wait => return self.check_ttl(now_ms).await,
            ExecutionState::Cancel => return self.cancel_active(now_ms).await,
            ExecutionState::Idle => {}
            ExecutionState::Place | ExecutionState::Done => return Ok(()),
        }

        if self.stopping {
            return Ok(());
        }

        if let Some(age) = self.ctx.dust_age_ms(now_ms) {
            if age >= self.settings.execution.dust_grace_ms {
                warn!(
                    key = %self.ctx.key,
                    remaining = %self.ctx.remaining,
                    min_qty = %self.ctx.limits.min_qty,
                    "Sweeping dust remainder, not traded"
                );
                return self.finish(Trigger::DustSwept, now_ms).await;
            }
            trace!(key = %self.ctx.key, age_ms = age, "Remainder is dust");
            return Ok(());
        }

        self.try_place(now_ms).await
    }

    async fn check_ttl(&mut self, now_ms: u64) -> ExecutorResult<()> {
        let Some(order) = self.ctx.active_order.as_ref() else {
            return Ok(());
        };
        let ttl = self.settings.execution.ttl_ms(order.mode);
        let age = order.age_ms(now_ms);
        if age < ttl {
            return Ok(());
        }
        info!(
            key = %self.ctx.key,
            order_id = %order.order_id,
            mode = %order.mode,
            age_ms = age,
            ttl_ms = ttl,
            unfilled = %order.quantity,
            "Order TTL expired, cancelling"
        );
        self.ctx.cancel_reason = Some(Trigger::TtlExpired);
        self.transition(Trigger::TtlExpired, now_ms)?;
        self.cancel_active(now_ms).await
    }

    // ========================================================================
    // Placement
    // ========================================================================

    async fn try_place(&mut self, now_ms: u64) -> ExecutorResult<()> {
        let settings = Arc::clone(&self.settings);
        let key = self.ctx.key.clone();
        let limits = self.ctx.limits;
        let position = PositionRisk {
            mark_price: self.ctx.mark_price,
            liquidation_price: self.ctx.liquidation_price,
        };

        let risk = &self.risk;
        let view = self.market.read(&key.symbol, |snap| {
            (
                risk.assess(&settings.risk, &position, Some(snap), now_ms),
                evaluate(snap, key.side, &settings.signal, limits.tick_size),
                snap.best_bid.zip(snap.best_ask),
                snap.reference_price(),
            )
        });
        let (decision, signal, book, reference_price) = match view {
            Some(v) => v,
            None => (
                risk.assess(&settings.risk, &position, None, now_ms),
                Default::default(),
                None,
                None,
            ),
        };

        if decision.block {
            let reason = decision.reason.map_or("unknown", |r| r.as_str());
            trace!(key = %key, reason, force = decision.force, "Placement blocked");
            Metrics::risk_block(reason);
            return Ok(());
        }

        let forced = decision.force;
        if !signal.triggered && !forced {
            return Ok(());
        }
        if !forced && !self.ctx.throttle.would_accept(now_ms) {
            trace!(key = %key, "Signal throttled");
            return Ok(());
        }
        let signal = if forced { signal.forced() } else { signal };
        let mode = if forced {
            ExecutionMode::AggressiveLimit
        } else {
            self.ctx.mode
        };

        let roi_mult = self.roi_multiplier(&settings);
        let decision_size = size(
            self.ctx.remaining,
            roi_mult,
            signal.acceleration_mult,
            &settings.execution,
            &limits,
            reference_price,
        );
        let quantity = match decision_size {
            SizeDecision::Order { quantity, .. } => quantity,
            SizeDecision::Complete => return self.finish(Trigger::Completed, now_ms).await,
            SizeDecision::NotOrderable(NotOrderable::Dust) => {
                debug!(key = %key, remaining = %self.ctx.remaining, "Remainder below min_qty");
                return Ok(());
            }
            SizeDecision::NotOrderable(reason) => {
                debug!(key = %key, reason = reason.as_str(), "No orderable quantity");
                return Ok(());
            }
        };

        let side = key.side.closing_side();
        let Some(q) = book.and_then(|(bid, ask)| {
            quote(mode, side, bid, ask, limits.tick_size, &settings.execution)
        }) else {
            debug!(key = %key, "No usable book for pricing");
            return Ok(());
        };

        if let Err(denied) = self.risk.limiter().try_acquire_place(now_ms, forced) {
            Metrics::risk_block(denied.as_str());
            return Ok(());
        }
        self.ctx.throttle.try_accept(now_ms);
        if forced {
            warn!(
                key = %key,
                liq_distance = ?decision.liq_distance,
                "Liquidation distance breached, forcing aggressive exit"
            );
            Metrics::forced_exit(key.symbol.as_str(), &key.side.to_string());
        }

        let request = PlaceOrderRequest {
            symbol: key.symbol.clone(),
            position_side: key.side,
            side,
            order_type: OrderType::Limit,
            price: Some(q.price),
            quantity,
            time_in_force: q.time_in_force,
            reduce_only: true,
            client_order_id: ClientOrderId::new(key.side),
        };

        self.transition(Trigger::Signal, now_ms)?;
        debug!(
            key = %key,
            reason = ?signal.reason,
            mode = %mode,
            qty = %quantity,
            price = %q.price,
            accel_mult = %signal.acceleration_mult,
            roi_mult = %roi_mult,
            "Placing order"
        );

        let backoff_ms = settings.execution.retry_backoff_ms(mode);
        let limit_ms = settings.execution.ttl_ms(mode);
        let result = self
            .with_retry(backoff_ms, limit_ms, |gw| gw.place_order(request.clone()))
            .await;

        match result {
            Ok(ack) => {
                info!(
                    key = %key,
                    order_id = %ack.order_id,
                    client_order_id = %ack.client_order_id,
                    mode = %mode,
                    qty = %quantity,
                    price = %q.price,
                    "Order placed"
                );
                Metrics::order_placed(key.symbol.as_str(), &key.side.to_string(), mode.as_str());
                self.ctx.active_order = Some(ActiveOrder {
                    order_id: ack.order_id,
                    client_order_id: request.client_order_id,
                    side,
                    price: q.price,
                    quantity,
                    original_quantity: quantity,
                    placed_at_ms: now_ms,
                    mode,
                    post_only: q.time_in_force.is_post_only(),
                });
                self.ctx.cancel_reason = None;
                self.transition(Trigger::Acknowledged, now_ms)?;
                Ok(())
            }
            Err(e) => {
                Metrics::placement_failed(e.as_str());
                self.transition(Trigger::PlacementFailed, now_ms)?;
                Err(e.into())
            }
        }
    }

    fn roi_multiplier(&self, settings: &SymbolSettings) -> Decimal {
        let (Some(entry), Some(leverage)) = (self.ctx.entry_price, self.ctx.leverage) else {
            return Decimal::ONE;
        };
        let pnl = self.ctx.unrealized_pnl.or_else(|| {
            self.ctx
                .mark_price
                .map(|mark| unrealized_pnl(self.ctx.key.side, self.ctx.remaining, entry, mark))
        });
        let roi = pnl.and_then(|pnl| compute_roi(pnl, self.ctx.remaining, entry, leverage));
        roi_multiplier(roi, &settings.signal.roi)
    }

    /// Run a gateway call bounded by `limit_ms`, retrying once after
    /// `backoff_ms` when the outcome is ambiguous.
    async fn with_retry<T, F>(&self, backoff_ms: u64, limit_ms: u64, call: F) -> GatewayResult<T>
    where
        F: Fn(&DynGateway) -> crate::gateway::BoxFuture<'_, GatewayResult<T>>,
    {
        match bounded(limit_ms, call(&self.gateway)).await {
            Err(e) if e.is_ambiguous() => {
                warn!(key = %self.ctx.key, error = %e, backoff_ms, "Gateway call failed, retrying once");
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                bounded(limit_ms, call(&self.gateway)).await
            }
            other => other,
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    async fn cancel_active(&mut self, now_ms: u64) -> ExecutorResult<()> {
        let Some(order) = self.ctx.active_order.clone() else {
            return self.cancel_settled(now_ms, "already_closed");
        };

        if !self
            .risk
            .limiter()
            .try_acquire_cancel(now_ms, &order.order_id)
        {
            Metrics::cancel("deferred");
            return Ok(());
        }

        let symbol = self.ctx.key.symbol.clone();
        let backoff_ms = self.settings.execution.retry_backoff_ms(order.mode);
        let limit_ms = self.settings.execution.ttl_ms(order.mode);
        let result = self
            .with_retry(backoff_ms, limit_ms, |gw| {
                gw.cancel_order(symbol.clone(), order.order_id.clone())
            })
            .await;

        match result {
            Ok(CancelOutcome::Cancelled) => self.cancel_settled(now_ms, "cancelled"),
            Ok(CancelOutcome::AlreadyClosed) => self.cancel_settled(now_ms, "already_closed"),
            Err(GatewayError::RateLimited) => {
                Metrics::cancel("rate_limited");
                warn!(key = %self.ctx.key, order_id = %order.order_id, "Cancel rate limited by exchange");
                Ok(())
            }
            Err(GatewayError::Rejected(reason)) => {
                // the exchange no longer knows the order
                debug!(key = %self.ctx.key, order_id = %order.order_id, %reason, "Cancel rejected");
                self.cancel_settled(now_ms, "rejected")
            }
            Err(e) => self.reconcile_cancel(&order, e, now_ms).await,
        }
    }

    /// Cancel outcome unknown: read the order back before deciding.
    async fn reconcile_cancel(
        &mut self,
        order: &ActiveOrder,
        cause: GatewayError,
        now_ms: u64,
    ) -> ExecutorResult<()> {
        let read = bounded(
            self.settings.execution.ttl_ms(order.mode),
            self.gateway
                .get_order(self.ctx.key.symbol.clone(), order.order_id.clone()),
        )
        .await;
        match read {
            Ok(report) if report.status.is_open() => {
                warn!(
                    key = %self.ctx.key,
                    order_id = %order.order_id,
                    error = %cause,
                    "Cancel unconfirmed, order still open"
                );
                Metrics::cancel("timeout");
                Err(ExecutorError::GatewayTimeout)
            }
            Ok(report) => {
                info!(
                    key = %self.ctx.key,
                    order_id = %order.order_id,
                    status = ?report.status,
                    executed_qty = %report.executed_qty,
                    "Cancel reconciled, order closed"
                );
                self.cancel_settled(now_ms, "reconciled")
            }
            Err(read_err) => {
                error!(
                    key = %self.ctx.key,
                    order_id = %order.order_id,
                    error = %cause,
                    read_error = %read_err,
                    "Order state unknown after cancel timeout, treating as cancelled"
                );
                self.cancel_settled(now_ms, "unknown")?;
                Err(ExecutorError::GatewayTimeout)
            }
        }
    }

    /// Active order is gone: count the timeout, start the cooldown.
    fn cancel_settled(&mut self, now_ms: u64, outcome: &'static str) -> ExecutorResult<()> {
        Metrics::cancel(outcome);
        let order = self.ctx.active_order.take();
        let mode = order.as_ref().map_or(self.ctx.mode, |o| o.mode);

        if let Some(order) = order.as_ref() {
            self.risk.limiter().clear_deferred(&order.order_id);
            self.ctx.retire_order(&order.order_id, now_ms);
            Metrics::order_lifetime(mode.as_str(), outcome, order.age_ms(now_ms));
            if self.ctx.cancel_reason == Some(Trigger::TtlExpired) {
                Metrics::order_timeout(mode.as_str());
                let settings = Arc::clone(&self.settings);
                let rotation = self.ctx.on_timeout(order.mode, &settings.execution);
                self.record_rotation(rotation);
            }
        }
        self.ctx.cancel_reason = None;

        if self.ctx.state == ExecutionState::Cancel {
            self.transition(Trigger::CancelConfirmed, now_ms)?;
            self.enter_cooldown(mode, now_ms);
        }
        Ok(())
    }

    // ========================================================================
    // Order events
    // ========================================================================

    pub async fn on_order_event(&mut self, event: &OrderEvent, now_ms: u64) -> ExecutorResult<()> {
        if self.ctx.state == ExecutionState::Done {
            return Ok(());
        }
        match &event.kind {
            OrderEventKind::Fill {
                fill_id,
                quantity,
                price,
            } => {
                let outcome = self.ctx.apply_fill(&event.order_id, fill_id, *quantity, now_ms);
                let FillOutcome::Applied {
                    active_fully_filled,
                } = outcome
                else {
                    debug!(key = %self.ctx.key, %fill_id, "Duplicate fill ignored");
                    Metrics::duplicate_fill();
                    return Ok(());
                };
                let mode = self
                    .ctx
                    .active_order
                    .as_ref()
                    .map_or(self.ctx.mode, |o| o.mode);
                info!(
                    key = %self.ctx.key,
                    order_id = %event.order_id,
                    %fill_id,
                    qty = %quantity,
                    price = %price,
                    remaining = %self.ctx.remaining,
                    "Fill applied"
                );
                Metrics::fill(
                    self.ctx.key.symbol.as_str(),
                    &self.ctx.key.side.to_string(),
                    mode.as_str(),
                );
                self.publish_remaining();
                self.ctx.last_action_ms = now_ms;

                if active_fully_filled {
                    self.order_gone(Trigger::Filled, now_ms)?;
                }
                if self.ctx.is_complete() {
                    return self.finish(Trigger::Completed, now_ms).await;
                }
                Ok(())
            }
            OrderEventKind::Closed { status } => {
                let is_active = self
                    .ctx
                    .active_order
                    .as_ref()
                    .is_some_and(|o| o.order_id == event.order_id);
                if !is_active {
                    trace!(key = %self.ctx.key, order_id = %event.order_id, "Close for inactive order");
                    return Ok(());
                }
                debug!(key = %self.ctx.key, order_id = %event.order_id, ?status, "Order closed");
                self.order_gone(Trigger::OrderClosed, now_ms)
            }
        }
    }

    /// The active order left the book (full fill or external close).
    fn order_gone(&mut self, trigger: Trigger, now_ms: u64) -> ExecutorResult<()> {
        let Some(order) = self.ctx.active_order.take() else {
            return Ok(());
        };
        self.risk.limiter().clear_deferred(&order.order_id);
        self.ctx.retire_order(&order.order_id, now_ms);
        let outcome = if trigger == Trigger::Filled {
            "filled"
        } else {
            "closed"
        };
        Metrics::order_lifetime(order.mode.as_str(), outcome, order.age_ms(now_ms));

        if trigger == Trigger::Filled {
            let settings = Arc::clone(&self.settings);
            let rotation = self.ctx.on_fill(order.mode, &settings.execution);
            self.record_rotation(rotation);
        }

        let was_cancelling = self.ctx.state == ExecutionState::Cancel;
        self.transition(trigger, now_ms)?;
        if was_cancelling {
            self.ctx.cancel_reason = None;
            self.enter_cooldown(order.mode, now_ms);
        }
        Ok(())
    }

    // ========================================================================
    // Position reports
    // ========================================================================

    pub async fn on_position(&mut self, report: &PositionReport, now_ms: u64) -> ExecutorResult<()> {
        if self.ctx.state == ExecutionState::Done {
            return Ok(());
        }
        self.ctx.update_position_facts(report);

        let tolerance = self.settings.execution.quantity_tolerance;
        match self.ctx.reconcile(report.quantity, tolerance) {
            Reconciliation::InSync => {}
            Reconciliation::Adopted { local, reported } => {
                let err = ExecutorError::DataInconsistency {
                    key: self.ctx.key.clone(),
                    local,
                    reported,
                };
                warn!(error = %err, "Remaining quantity reconciled to gateway");
                Metrics::data_inconsistency(
                    self.ctx.key.symbol.as_str(),
                    &self.ctx.key.side.to_string(),
                );
                self.publish_remaining();
            }
            Reconciliation::Deferred { local, reported } => {
                debug!(
                    key = %self.ctx.key,
                    local = %local,
                    reported = %reported,
                    "Gateway quantity above local while order open, deferring"
                );
            }
        }

        if self.ctx.is_complete() {
            return self.finish(Trigger::Completed, now_ms).await;
        }
        self.sync_protective_stop(true).await;
        Ok(())
    }

    // ========================================================================
    // Protective stop
    // ========================================================================

    async fn sync_protective_stop(&mut self, has_position: bool) {
        if !self.stop_planner.config().enabled && self.protective_stop.is_none() {
            return;
        }
        let action = self.stop_planner.plan(
            &self.ctx.key.symbol,
            self.ctx.key.side,
            has_position,
            self.ctx.liquidation_price,
            self.ctx.limits.tick_size,
            self.protective_stop.as_ref(),
        );
        match action {
            StopAction::Keep => {}
            StopAction::Place {
                stop_price,
                client_order_id,
            } => self.place_stop(stop_price, client_order_id, "place").await,
            StopAction::Replace {
                cancel_order_id,
                stop_price,
                client_order_id,
            } => {
                if self.cancel_stop(&cancel_order_id, "replace").await {
                    self.place_stop(stop_price, client_order_id, "replace").await;
                }
            }
            StopAction::Cancel { order_id, reason } => {
                self.cancel_stop(&order_id, reason).await;
            }
        }
    }

    async fn place_stop(&mut self, stop_price: Price, client_order_id: ClientOrderId, action: &'static str) {
        let request = StopOrderRequest {
            symbol: self.ctx.key.symbol.clone(),
            position_side: self.ctx.key.side,
            stop_price,
            client_order_id: client_order_id.clone(),
        };
        let limit_ms = self.settings.execution.ttl_ms(self.ctx.mode);
        match bounded(limit_ms, self.gateway.place_stop_order(request)).await {
            Ok(ack) => {
                info!(
                    key = %self.ctx.key,
                    order_id = %ack.order_id,
                    stop_price = %stop_price,
                    action,
                    "Protective stop placed"
                );
                Metrics::protective_stop(action);
                self.protective_stop = Some(ExistingStop {
                    order_id: ack.order_id,
                    client_order_id,
                    stop_price,
                });
            }
            Err(e) => warn!(key = %self.ctx.key, error = %e, "Protective stop placement failed"),
        }
    }

    /// Returns true once the stop is known to be gone.
    async fn cancel_stop(&mut self, order_id: &str, reason: &'static str) -> bool {
        let result = bounded(
            self.settings.execution.ttl_ms(self.ctx.mode),
            self.gateway
                .cancel_order(self.ctx.key.symbol.clone(), order_id.to_string()),
        )
        .await;
        match result {
            Ok(_) | Err(GatewayError::Rejected(_)) => {
                debug!(key = %self.ctx.key, order_id, reason, "Protective stop cancelled");
                if reason != "replace" {
                    Metrics::protective_stop("cancel");
                }
                self.protective_stop = None;
                true
            }
            Err(e) => {
                warn!(key = %self.ctx.key, order_id, error = %e, "Protective stop cancel failed");
                false
            }
        }
    }

    // ========================================================================
    // Completion / drain
    // ========================================================================

    /// Move to DONE: best-effort cancel of anything still resting.
    async fn finish(&mut self, trigger: Trigger, now_ms: u64) -> ExecutorResult<()> {
        if let Some(order) = self.ctx.active_order.take() {
            let result = bounded(
                self.settings.execution.ttl_ms(order.mode),
                self.gateway
                    .cancel_order(self.ctx.key.symbol.clone(), order.order_id.clone()),
            )
            .await;
            if let Err(e) = result {
                warn!(key = %self.ctx.key, order_id = %order.order_id, error = %e, "Leftover order cancel failed");
            }
            self.risk.limiter().clear_deferred(&order.order_id);
            self.ctx.retire_order(&order.order_id, now_ms);
        }
        self.sync_protective_stop(false).await;
        self.transition(trigger, now_ms)?;
        self.publish_remaining();
        info!(
            key = %self.ctx.key,
            remaining = %self.ctx.remaining,
            reason = trigger.as_str(),
            "Position side done"
        );
        Ok(())
    }

    /// Stop placing and cancel the active order. Bounded: one cancel
    /// attempt, one retry, one reconciliation read.
    pub async fn drain(&mut self, now_ms: u64) -> DrainReport {
        self.stopping = true;
        if self.ctx.active_order.is_some() {
            if self.ctx.state == ExecutionState::Wait {
                self.ctx.cancel_reason = Some(Trigger::StopRequested);
                if let Err(e) = self.transition(Trigger::StopRequested, now_ms) {
                    warn!(key = %self.ctx.key, error = %e, "Drain transition failed");
                }
            }
            if let Err(e) = self.cancel_active(now_ms).await {
                warn!(key = %self.ctx.key, error = %e, "Drain cancel failed");
            }
        }
        let residual_order = self.ctx.active_order.as_ref().map(|o| o.order_id.clone());
        DrainReport {
            key: self.ctx.key.clone(),
            residual_order,
        }
    }
}
