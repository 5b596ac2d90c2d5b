//! Supervisor.
//!
//! Owns at most one controller worker per (instrument, side):
//! - Creates one when a previously absent side shows nonzero quantity
//! - Routes market updates and timer ticks to the instrument's workers
//! - Routes order events and position reports to the owning worker
//! - Removes workers that reached DONE or died
//! - Drains everything on stop, bounded by a timeout
//!
//! A failing or panicking controller is logged and removed; its siblings
//! keep running.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vq_core::{
    ControllerKey, DynClock, InstrumentLimits, MarketEvent, OrderEvent, PositionSide, Symbol,
};
use vq_feed::MarketState;
use vq_risk::RiskGuard;
use vq_telemetry::Metrics;

use crate::config::SymbolSettings;
use crate::context::ControllerStatus;
use crate::controller::{DrainReport, ExecutionController};
use crate::error::{ExecutorError, ExecutorResult};
use crate::gateway::{DynGateway, PositionReport};
use crate::worker::{spawn_worker, ControllerMsg, WorkerHandle};

/// Supervisor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Per-controller message queue length.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on the whole drain at stop.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_drain_timeout_ms() -> u64 {
    3_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// Result of [`Supervisor::request_stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Orders that may still rest on the exchange.
    pub residual_orders: Vec<(ControllerKey, String)>,
    /// Controllers that did not answer before the drain timeout.
    pub timed_out: Vec<ControllerKey>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.residual_orders.is_empty() && self.timed_out.is_empty()
    }
}

pub struct Supervisor {
    gateway: DynGateway,
    market: Arc<MarketState>,
    risk: RiskGuard,
    clock: DynClock,
    default_settings: Arc<SymbolSettings>,
    symbol_settings: HashMap<Symbol, Arc<SymbolSettings>>,
    limits: HashMap<Symbol, InstrumentLimits>,
    workers: HashMap<ControllerKey, WorkerHandle>,
    done_tx: mpsc::UnboundedSender<ControllerKey>,
    done_rx: mpsc::UnboundedReceiver<ControllerKey>,
    config: SupervisorConfig,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        gateway: DynGateway,
        market: Arc<MarketState>,
        risk: RiskGuard,
        clock: DynClock,
        default_settings: Arc<SymbolSettings>,
        config: SupervisorConfig,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            market,
            risk,
            clock,
            default_settings,
            symbol_settings: HashMap::new(),
            limits: HashMap::new(),
            workers: HashMap::new(),
            done_tx,
            done_rx,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled once [`Self::request_stop`] begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn market(&self) -> &Arc<MarketState> {
        &self.market
    }

    pub fn settings_for(&self, symbol: &Symbol) -> Arc<SymbolSettings> {
        self.symbol_settings
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_settings))
    }

    /// Instruments with overrides or live controllers.
    pub fn known_symbols(&self) -> Vec<Symbol> {
        let set: BTreeSet<Symbol> = self
            .symbol_settings
            .keys()
            .cloned()
            .chain(self.workers.keys().map(|k| k.symbol.clone()))
            .collect();
        set.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Replace the settings snapshot for `symbol` (or the default when
    /// `None`) and push it to the affected controllers.
    pub fn update_settings(
        &mut self,
        symbol: Option<Symbol>,
        settings: Arc<SymbolSettings>,
    ) -> ExecutorResult<()> {
        settings.validate()?;
        match symbol {
            Some(sym) => {
                self.symbol_settings.insert(sym.clone(), Arc::clone(&settings));
                self.broadcast_settings(|key| key.symbol == sym, &settings);
            }
            None => {
                self.default_settings = Arc::clone(&settings);
                let overridden: Vec<Symbol> = self.symbol_settings.keys().cloned().collect();
                self.broadcast_settings(|key| !overridden.contains(&key.symbol), &settings);
            }
        }
        Ok(())
    }

    fn broadcast_settings(
        &self,
        filter: impl Fn(&ControllerKey) -> bool,
        settings: &Arc<SymbolSettings>,
    ) {
        for (key, handle) in self.workers.iter().filter(|(k, _)| filter(k)) {
            if let Err(e) = handle.send(ControllerMsg::Settings(Arc::clone(settings))) {
                warn!(%key, error = %e, "Settings update not delivered");
            }
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Apply a market event and nudge the instrument's controllers.
    pub fn on_market_event(&mut self, event: &MarketEvent) {
        let now_ms = self.clock.now_ms();
        if let Err(e) = self.market.apply(event, now_ms) {
            debug!(symbol = %event.symbol(), error = %e, "Market event dropped");
            return;
        }
        for (key, handle) in &self.workers {
            if &key.symbol == event.symbol() && !handle.nudge(ControllerMsg::Market { now_ms }) {
                debug!(%key, "Controller queue full, market nudge coalesced");
            }
        }
    }

    /// Route an order event to its controller, preserving order. Does not
    /// wait for the controller, which may be inside a gateway call.
    pub fn on_order_event(&mut self, event: OrderEvent) -> ExecutorResult<()> {
        let key = event.key();
        let Some(handle) = self.workers.get(&key) else {
            debug!(%key, order_id = %event.order_id, "Order event for unknown controller");
            return Ok(());
        };
        let now_ms = self.clock.now_ms();
        match handle.send(ControllerMsg::Order { event, now_ms }) {
            // worker finished between lookup and send; reaped on next pass
            Err(ExecutorError::ChannelClosed) => {
                debug!(%key, "Order event for finished controller");
                Ok(())
            }
            other => other,
        }
    }

    /// Route a position report, creating a controller for a newly seen
    /// side holding at least one orderable lot. Dust positions are left
    /// alone: a controller for them could only sweep itself.
    pub async fn observe_position(&mut self, report: PositionReport) -> ExecutorResult<()> {
        self.reap().await;
        let key = ControllerKey::new(report.symbol.clone(), report.side);
        let now_ms = self.clock.now_ms();

        if let Some(handle) = self.workers.get(&key) {
            return handle.send(ControllerMsg::Position { report, now_ms });
        }
        if self.is_stopping() || !report.quantity.is_positive() {
            return Ok(());
        }

        let limits = self.instrument_limits(&report.symbol).await?;
        if limits.round_qty(report.quantity) < limits.min_qty {
            debug!(
                %key,
                qty = %report.quantity,
                min_qty = %limits.min_qty,
                "Position below min_qty, not tracked"
            );
            return Ok(());
        }

        let settings = self.settings_for(&report.symbol);
        let controller = ExecutionController::new(
            key.clone(),
            &report,
            limits,
            settings,
            Arc::clone(&self.gateway),
            Arc::clone(&self.market),
            self.risk.clone(),
            now_ms,
        );
        let handle = spawn_worker(controller, self.config.queue_capacity, self.done_tx.clone());
        info!(%key, qty = %report.quantity, "Controller started");
        Metrics::controller_started();
        self.workers.insert(key, handle);
        Ok(())
    }

    async fn instrument_limits(&mut self, symbol: &Symbol) -> ExecutorResult<InstrumentLimits> {
        if let Some(limits) = self.limits.get(symbol) {
            return Ok(*limits);
        }
        let limits = self
            .gateway
            .get_instrument_limits(symbol.clone())
            .await
            .map_err(|e| ExecutorError::UnknownInstrument(format!("{symbol}: {e}")))?;
        limits
            .validate()
            .map_err(|e| ExecutorError::UnknownInstrument(format!("{symbol}: {e}")))?;
        self.limits.insert(symbol.clone(), limits);
        Ok(limits)
    }

    /// Timer pass for every controller.
    pub async fn tick(&mut self) {
        self.reap().await;
        let now_ms = self.clock.now_ms();
        for (key, handle) in &self.workers {
            if !handle.nudge(ControllerMsg::Tick { now_ms }) {
                debug!(%key, "Controller queue full, tick coalesced");
            }
        }
    }

    /// Poll the gateway for both sides of every known instrument.
    pub async fn refresh_positions(&mut self) {
        for symbol in self.known_symbols() {
            for side in PositionSide::BOTH {
                match self.gateway.get_position(symbol.clone(), side).await {
                    Ok(report) => {
                        if let Err(e) = self.observe_position(report).await {
                            warn!(%symbol, %side, error = %e, "Position report not applied");
                        }
                    }
                    Err(e) => warn!(%symbol, %side, error = %e, "Position refresh failed"),
                }
            }
        }
    }

    /// Remove workers that reached DONE or exited abnormally.
    pub async fn reap(&mut self) {
        while let Ok(key) = self.done_rx.try_recv() {
            if let Some(handle) = self.workers.remove(&key) {
                let status = handle.status();
                info!(%key, remaining = %status.remaining, "Controller removed");
                Metrics::controller_finished(key.symbol.as_str(), &key.side.to_string(), "done");
                let _ = handle.join().await;
            }
        }

        let dead: Vec<ControllerKey> = self
            .workers
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            let Some(handle) = self.workers.remove(&key) else {
                continue;
            };
            match handle.join().await {
                Err(e) if e.is_panic() => {
                    error!(%key, "Controller panicked, removed");
                    Metrics::controller_finished(key.symbol.as_str(), &key.side.to_string(), "panicked");
                }
                _ => {
                    warn!(%key, "Controller exited unexpectedly, removed");
                    Metrics::controller_finished(key.symbol.as_str(), &key.side.to_string(), "exited");
                }
            }
        }
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn statuses(&self) -> Vec<ControllerStatus> {
        let mut all: Vec<ControllerStatus> = self.workers.values().map(WorkerHandle::status).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn status(&self, key: &ControllerKey) -> Option<ControllerStatus> {
        self.workers.get(key).map(WorkerHandle::status)
    }

    // ========================================================================
    // Stop
    // ========================================================================

    /// Stop creating controllers, drain every worker and report what may
    /// still rest on the exchange. Never waits past `drain_timeout_ms`,
    /// even when a controller is stuck inside a gateway call.
    pub async fn request_stop(&mut self) -> StopReport {
        self.shutdown.cancel();
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.drain_timeout_ms);
        let now_ms = self.clock.now_ms();
        info!(controllers = self.workers.len(), "Stop requested, draining");

        let mut pending: Vec<(ControllerKey, oneshot::Receiver<DrainReport>, WorkerHandle)> =
            Vec::with_capacity(self.workers.len());
        for (key, handle) in self.workers.drain() {
            let (reply, rx) = oneshot::channel();
            if handle.send(ControllerMsg::Stop { now_ms, reply }).is_err() {
                debug!(%key, "Controller already gone at stop");
                Metrics::controller_finished(key.symbol.as_str(), &key.side.to_string(), "stopped");
                continue;
            }
            pending.push((key, rx, handle));
        }

        let mut report = StopReport::default();
        for (key, rx, handle) in pending {
            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(drain)) => {
                    if let Some(order_id) = drain.residual_order {
                        error!(%key, %order_id, "Residual order after drain, reconcile manually");
                        report.residual_orders.push((key.clone(), order_id));
                    }
                }
                Ok(Err(_)) => {
                    warn!(%key, "Controller exited without drain report");
                }
                Err(_) => {
                    let status = handle.status();
                    error!(
                        %key,
                        active_order = ?status.active_order_id,
                        "Drain timed out, reconcile manually"
                    );
                    handle.abort();
                    if let Some(order_id) = status.active_order_id {
                        report.residual_orders.push((key.clone(), order_id));
                    }
                    report.timed_out.push(key.clone());
                }
            }
            Metrics::controller_finished(key.symbol.as_str(), &key.side.to_string(), "stopped");
        }
        info!(
            residual = report.residual_orders.len(),
            timed_out = report.timed_out.len(),
            "Drain complete"
        );
        report
    }
}
