//! Position side context.
//!
//! All mutable state of one (instrument, side). Owned by exactly one
//! controller, so none of it is locked.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use vq_core::{
    ActiveOrder, ControllerKey, ExecutionMode, ExecutionState, FillId, InstrumentLimits, Price,
    Size,
};
use vq_signal::SignalThrottle;

use crate::config::ExecutionSettings;
use crate::gateway::PositionReport;
use crate::transition::Trigger;

// ============================================================================
// Mode rotation
// ============================================================================

/// Consecutive-outcome counters driving mode rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCounters {
    pub maker_timeouts: u32,
    pub aggr_timeouts: u32,
    pub aggr_fills: u32,
}

/// A mode change decided by the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub from: ExecutionMode,
    pub to: ExecutionMode,
}

// ============================================================================
// Fill application
// ============================================================================

/// How long fill IDs of an order that left the book stay known.
pub const FILL_DEDUP_GRACE_MS: u64 = 60_000;

/// Fill IDs applied for one order.
#[derive(Debug, Clone, Default)]
struct OrderFills {
    fill_ids: HashSet<FillId>,
    /// Set once the order left the book; the entry expires
    /// [`FILL_DEDUP_GRACE_MS`] later.
    retired_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Fill ID already applied.
    Duplicate,
    Applied {
        /// The fill belonged to the active order and left nothing open.
        active_fully_filled: bool,
    },
}

/// Result of reconciling against a gateway position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    InSync,
    /// Local remaining replaced by the gateway value.
    Adopted { local: Size, reported: Size },
    /// Gateway reports more than we hold while an order is open; fills
    /// may still be in flight, so the next report decides.
    Deferred { local: Size, reported: Size },
}

// ============================================================================
// PositionSideContext
// ============================================================================

#[derive(Debug, Clone)]
pub struct PositionSideContext {
    pub key: ControllerKey,
    /// Quantity still to exit; only fills and gateway reconciliation
    /// change it.
    pub remaining: Size,
    pub entry_price: Option<Price>,
    pub liquidation_price: Option<Price>,
    pub mark_price: Option<Price>,
    pub unrealized_pnl: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub limits: InstrumentLimits,
    pub mode: ExecutionMode,
    pub state: ExecutionState,
    pub active_order: Option<ActiveOrder>,
    /// No placement before this time (Unix milliseconds).
    pub cooldown_until_ms: u64,
    pub throttle: SignalThrottle,
    pub last_action_ms: u64,
    /// Why the active order is being cancelled.
    pub cancel_reason: Option<Trigger>,
    rotation: RotationCounters,
    /// Dedup state per order ID.
    seen_fills: HashMap<String, OrderFills>,
    dust_since_ms: Option<u64>,
}

impl PositionSideContext {
    pub fn new(
        key: ControllerKey,
        report: &PositionReport,
        limits: InstrumentLimits,
        min_signal_interval_ms: u64,
        now_ms: u64,
    ) -> Self {
        let mut ctx = Self {
            key,
            remaining: report.quantity,
            entry_price: None,
            liquidation_price: None,
            mark_price: None,
            unrealized_pnl: None,
            leverage: None,
            limits,
            mode: ExecutionMode::MakerOnly,
            state: ExecutionState::Idle,
            active_order: None,
            cooldown_until_ms: 0,
            throttle: SignalThrottle::new(min_signal_interval_ms),
            last_action_ms: now_ms,
            cancel_reason: None,
            rotation: RotationCounters::default(),
            seen_fills: HashMap::new(),
            dust_since_ms: None,
        };
        ctx.update_position_facts(report);
        ctx
    }

    /// Refresh prices and PnL; quantity is handled by [`Self::reconcile`].
    pub fn update_position_facts(&mut self, report: &PositionReport) {
        if report.entry_price.is_some() {
            self.entry_price = report.entry_price;
        }
        self.liquidation_price = report.liquidation_price;
        if report.mark_price.is_some() {
            self.mark_price = report.mark_price;
        }
        self.unrealized_pnl = report.unrealized_pnl;
        if report.leverage.is_some() {
            self.leverage = report.leverage;
        }
    }

    /// Reconcile `remaining` with the gateway's quantity.
    ///
    /// The gateway is the source of truth for position size, so a
    /// divergence is resolved in its favour in both directions. Fills only
    /// ever shrink `remaining`; an increase comes from the position itself
    /// growing outside this controller, and the larger size is what must
    /// be exited. While an order is open an increase is held back, since
    /// its fills may still be in flight.
    pub fn reconcile(&mut self, reported: Size, tolerance: Size) -> Reconciliation {
        let local = self.remaining;
        let drift = (reported.inner() - local.inner()).abs();
        if drift <= tolerance.inner() {
            return Reconciliation::InSync;
        }
        if reported > local && self.active_order.is_some() {
            return Reconciliation::Deferred { local, reported };
        }
        self.remaining = reported;
        Reconciliation::Adopted { local, reported }
    }

    /// Apply a fill once per (order, fill ID).
    ///
    /// Remaining always shrinks, even for fills of an order that is no
    /// longer active (late fills after a cancel).
    pub fn apply_fill(
        &mut self,
        order_id: &str,
        fill_id: &FillId,
        quantity: Size,
        now_ms: u64,
    ) -> FillOutcome {
        self.prune_fills(now_ms);
        let is_active = self
            .active_order
            .as_ref()
            .is_some_and(|o| o.order_id == order_id);
        let fills = self
            .seen_fills
            .entry(order_id.to_string())
            .or_insert_with(|| OrderFills {
                fill_ids: HashSet::new(),
                retired_at_ms: (!is_active).then_some(now_ms),
            });
        if !fills.fill_ids.insert(fill_id.clone()) {
            return FillOutcome::Duplicate;
        }
        self.remaining = self.remaining.saturating_sub(quantity);

        let mut active_fully_filled = false;
        if let Some(order) = self.active_order.as_mut() {
            if order.order_id == order_id {
                order.quantity = order.quantity.saturating_sub(quantity);
                active_fully_filled = !order.quantity.is_positive();
            }
        }
        FillOutcome::Applied {
            active_fully_filled,
        }
    }

    /// `order_id` left the book; its fill IDs expire after the grace period.
    pub fn retire_order(&mut self, order_id: &str, now_ms: u64) {
        if let Some(fills) = self.seen_fills.get_mut(order_id) {
            fills.retired_at_ms.get_or_insert(now_ms);
        }
        self.prune_fills(now_ms);
    }

    fn prune_fills(&mut self, now_ms: u64) {
        self.seen_fills.retain(|_, fills| {
            fills
                .retired_at_ms
                .map_or(true, |at| now_ms.saturating_sub(at) < FILL_DEDUP_GRACE_MS)
        });
    }

    /// Orders whose fill IDs are still remembered.
    pub fn tracked_fill_orders(&self) -> usize {
        self.seen_fills.len()
    }

    /// Nothing left under the lot step.
    pub fn is_complete(&self) -> bool {
        self.limits.rounds_to_zero(self.remaining)
    }

    /// Positive remainder that can never be ordered.
    pub fn is_dust(&self) -> bool {
        !self.is_complete() && self.limits.round_qty(self.remaining) < self.limits.min_qty
    }

    /// Track continuous dust; returns how long the side has been dust.
    pub fn dust_age_ms(&mut self, now_ms: u64) -> Option<u64> {
        if !self.is_dust() {
            self.dust_since_ms = None;
            return None;
        }
        let since = *self.dust_since_ms.get_or_insert(now_ms);
        Some(now_ms.saturating_sub(since))
    }

    pub fn rotation_counters(&self) -> RotationCounters {
        self.rotation
    }

    /// Count a TTL expiry of an order priced in `order_mode`.
    ///
    /// Orders priced under a one-off override (liquidation force) do not
    /// count toward the current mode.
    pub fn on_timeout(&mut self, order_mode: ExecutionMode, settings: &ExecutionSettings) -> Option<Rotation> {
        if order_mode != self.mode {
            return None;
        }
        match self.mode {
            ExecutionMode::MakerOnly => {
                self.rotation.maker_timeouts += 1;
                (self.rotation.maker_timeouts >= settings.maker_timeouts_to_escalate)
                    .then(|| self.rotate(ExecutionMode::AggressiveLimit))
            }
            ExecutionMode::AggressiveLimit => {
                self.rotation.aggr_timeouts += 1;
                self.rotation.aggr_fills = 0;
                (settings.aggr_timeouts_to_deescalate > 0
                    && self.rotation.aggr_timeouts >= settings.aggr_timeouts_to_deescalate)
                    .then(|| self.rotate(ExecutionMode::MakerOnly))
            }
        }
    }

    /// Count a full fill of an order priced in `order_mode`.
    pub fn on_fill(&mut self, order_mode: ExecutionMode, settings: &ExecutionSettings) -> Option<Rotation> {
        if order_mode != self.mode {
            return None;
        }
        match self.mode {
            ExecutionMode::MakerOnly => {
                self.rotation.maker_timeouts = 0;
                None
            }
            ExecutionMode::AggressiveLimit => {
                self.rotation.aggr_timeouts = 0;
                self.rotation.aggr_fills += 1;
                (settings.aggr_fills_to_deescalate > 0
                    && self.rotation.aggr_fills >= settings.aggr_fills_to_deescalate)
                    .then(|| self.rotate(ExecutionMode::MakerOnly))
            }
        }
    }

    fn rotate(&mut self, to: ExecutionMode) -> Rotation {
        let from = self.mode;
        self.mode = to;
        self.rotation = RotationCounters::default();
        Rotation { from, to }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            key: self.key.clone(),
            state: self.state,
            mode: self.mode,
            remaining: self.remaining,
            last_action_ms: self.last_action_ms,
            active_order_id: self.active_order.as_ref().map(|o| o.order_id.clone()),
        }
    }
}

/// Read-only view of one controller for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub key: ControllerKey,
    pub state: ExecutionState,
    pub mode: ExecutionMode,
    pub remaining: Size,
    pub last_action_ms: u64,
    pub active_order_id: Option<String>,
}
