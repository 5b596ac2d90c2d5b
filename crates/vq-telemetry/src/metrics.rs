//! Prometheus metrics for the exit executor.
//!
//! Covers:
//! - Order flow (placements, fills, timeouts, cancels, rejections)
//! - Mode rotation between maker and aggressive pricing
//! - Risk guard blocks and data inconsistencies
//! - Live controller count and remaining quantity per position side
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_gauge, CounterVec, GaugeVec, HistogramVec, IntCounter, IntGauge,
};

// ============================================================================
// Order flow
// ============================================================================

/// Orders acknowledged by the gateway.
/// Labels: symbol, side, mode (maker_only/aggressive_limit)
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_orders_placed_total",
        "Reduce-only orders acknowledged by the gateway",
        &["symbol", "side", "mode"]
    )
    .unwrap()
});

/// Fill events applied to a position side (after deduplication).
pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_fills_total",
        "Fill events applied to remaining quantity",
        &["symbol", "side", "mode"]
    )
    .unwrap()
});

/// Duplicate fill events dropped.
pub static DUPLICATE_FILLS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "vq_duplicate_fills_total",
        "Fill events dropped as already applied"
    )
    .unwrap()
});

/// Orders that reached their TTL without a full fill.
pub static TIMEOUTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_order_timeouts_total",
        "Orders cancelled after exceeding the mode TTL",
        &["mode"]
    )
    .unwrap()
});

/// Cancel outcomes.
/// Labels: result (cancelled/already_closed/deferred/timeout/rejected/reconciled)
pub static CANCELS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_cancels_total",
        "Cancel attempts by outcome",
        &["result"]
    )
    .unwrap()
});

/// Placement failures.
/// Labels: reason (rejected/rate_limited/timeout/transport)
pub static REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_placement_failures_total",
        "Placements that did not reach WAIT",
        &["reason"]
    )
    .unwrap()
});

/// Order age at terminal outcome (ms).
pub static ORDER_LIFETIME_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vq_order_lifetime_ms",
        "Order age when it left WAIT",
        &["mode", "outcome"],
        vec![50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0]
    )
    .unwrap()
});

// ============================================================================
// Mode rotation & risk
// ============================================================================

/// Execution mode changes.
pub static MODE_ROTATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_mode_rotations_total",
        "Execution mode rotations",
        &["from", "to"]
    )
    .unwrap()
});

/// Placements vetoed by the risk guard.
/// Labels: reason (stale_market_data/rate_limited/cancel_priority)
pub static RISK_BLOCKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_risk_blocks_total",
        "Placements blocked by the risk guard",
        &["reason"]
    )
    .unwrap()
});

/// Exits forced by liquidation proximity.
pub static FORCED_EXITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_forced_exits_total",
        "Placements forced by liquidation distance",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Gateway position quantity disagreed with local remaining quantity.
pub static DATA_INCONSISTENCY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_data_inconsistency_total",
        "Remaining quantity reconciled to the gateway value",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Protective stop actions executed.
/// Labels: action (place/replace/cancel)
pub static PROTECTIVE_STOP_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_protective_stop_total",
        "Protective stop actions sent to the gateway",
        &["action"]
    )
    .unwrap()
});

// ============================================================================
// Controllers
// ============================================================================

/// Live execution controllers.
pub static ACTIVE_CONTROLLERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("vq_active_controllers", "Live execution controllers").unwrap()
});

/// Remaining quantity per position side.
pub static REMAINING_QTY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "vq_remaining_qty",
        "Remaining quantity to exit",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Controllers finished, by how they finished.
/// Labels: outcome (complete/dust/panicked)
pub static CONTROLLERS_FINISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vq_controllers_finished_total",
        "Execution controllers removed from the supervisor",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn order_placed(symbol: &str, side: &str, mode: &str) {
        ORDERS_PLACED_TOTAL
            .with_label_values(&[symbol, side, mode])
            .inc();
    }

    pub fn fill(symbol: &str, side: &str, mode: &str) {
        FILLS_TOTAL.with_label_values(&[symbol, side, mode]).inc();
    }

    pub fn duplicate_fill() {
        DUPLICATE_FILLS_TOTAL.inc();
    }

    pub fn order_timeout(mode: &str) {
        TIMEOUTS_TOTAL.with_label_values(&[mode]).inc();
    }

    pub fn cancel(result: &str) {
        CANCELS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Record a placement that failed before reaching WAIT.
    pub fn placement_failed(reason: &str) {
        REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record how long an order rested before fill/cancel.
    pub fn order_lifetime(mode: &str, outcome: &str, age_ms: u64) {
        ORDER_LIFETIME_MS
            .with_label_values(&[mode, outcome])
            .observe(age_ms as f64);
    }

    pub fn mode_rotation(from: &str, to: &str) {
        MODE_ROTATIONS_TOTAL.with_label_values(&[from, to]).inc();
    }

    pub fn risk_block(reason: &str) {
        RISK_BLOCKS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn forced_exit(symbol: &str, side: &str) {
        FORCED_EXITS_TOTAL.with_label_values(&[symbol, side]).inc();
    }

    pub fn data_inconsistency(symbol: &str, side: &str) {
        DATA_INCONSISTENCY_TOTAL
            .with_label_values(&[symbol, side])
            .inc();
    }

    pub fn protective_stop(action: &str) {
        PROTECTIVE_STOP_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn controller_started() {
        ACTIVE_CONTROLLERS.inc();
    }

    /// Record a controller leaving the supervisor.
    pub fn controller_finished(symbol: &str, side: &str, outcome: &str) {
        ACTIVE_CONTROLLERS.dec();
        CONTROLLERS_FINISHED_TOTAL
            .with_label_values(&[outcome])
            .inc();
        let _ = REMAINING_QTY.remove_label_values(&[symbol, side]);
    }

    /// Set remaining quantity (lossy float conversion is fine for a gauge).
    pub fn remaining_qty(symbol: &str, side: &str, qty: f64) {
        REMAINING_QTY.with_label_values(&[symbol, side]).set(qty);
    }
}
