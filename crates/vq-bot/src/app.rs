//! Main application orchestration.
//!
//! Coordinates:
//! - Feed replay into the shared market snapshot store
//! - Paper exchange matching and order event routing
//! - Supervisor timer passes and position polling
//! - Bounded drain on end of replay or Ctrl-C

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vq_core::{Clock, ManualClock, OrderEventKind};
use vq_executor::{StopReport, Supervisor};
use vq_feed::MarketState;
use vq_risk::{RateLimiter, RiskGuard};

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::paper::PaperGateway;
use crate::replay::{ReplayReader, ReplayRecord};

/// Outcome of one replay run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Replay records applied.
    pub records: u64,
    /// Paper fills routed to controllers.
    pub fills: u64,
    pub stop: StopReport,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    supervisor: Supervisor,
    paper: Arc<PaperGateway>,
    /// Replay time: advanced by record timestamps.
    clock: Arc<ManualClock>,
    last_tick_ms: Option<u64>,
    last_refresh_ms: Option<u64>,
    records: u64,
    fills: u64,
}

impl Application {
    /// Build the supervisor over the paper exchange and install the merged
    /// per-instrument settings.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let paper = Arc::new(PaperGateway::new(config.paper.limits()));
        let clock = Arc::new(ManualClock::new(0));
        let per_symbol = config.merged_all()?;
        let history_window_ms = per_symbol
            .iter()
            .map(|(_, s)| s.signal.accel.max_window_ms())
            .chain(std::iter::once(config.global.signal.accel.max_window_ms()))
            .max()
            .unwrap_or(0)
            .max(1_000);
        let market = Arc::new(MarketState::new(history_window_ms));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let mut supervisor = Supervisor::new(
            paper.clone(),
            market,
            RiskGuard::new(limiter),
            clock.clone(),
            Arc::new(config.global.clone()),
            config.supervisor.clone(),
        );
        for (symbol, settings) in per_symbol {
            debug!(%symbol, "Installing instrument settings");
            supervisor.update_settings(Some(symbol), settings)?;
        }

        Ok(Self {
            config,
            supervisor,
            paper,
            clock,
            last_tick_ms: None,
            last_refresh_ms: None,
            records: 0,
            fills: 0,
        })
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn paper(&self) -> &Arc<PaperGateway> {
        &self.paper
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Apply one replay record, then run due timer passes.
    pub async fn apply_record(&mut self, record: ReplayRecord) -> AppResult<()> {
        if let Some(time_ms) = record.time_ms() {
            self.clock.set(time_ms);
        }
        let now_ms = self.clock.now_ms();

        if let Some(event) = record.market_event() {
            self.paper.on_market(&event, now_ms);
            self.supervisor.on_market_event(&event);
        } else {
            match record {
                ReplayRecord::Position { report, .. } => {
                    self.paper.set_position(report.clone());
                    if let Err(e) = self.supervisor.observe_position(report).await {
                        warn!(error = %e, "Position record not applied");
                    }
                }
                ReplayRecord::Order(event) => {
                    if let Err(e) = self.supervisor.on_order_event(event) {
                        warn!(error = %e, "Order record not applied");
                    }
                }
                ReplayRecord::Trade(_) | ReplayRecord::BookTicker(_) => {}
            }
        }
        self.records += 1;

        self.route_paper_events();
        self.run_timers(now_ms).await;
        Ok(())
    }

    /// Timer pass driven by wall time (between records).
    pub async fn on_tick(&mut self) {
        self.route_paper_events();
        self.supervisor.tick().await;
    }

    async fn run_timers(&mut self, now_ms: u64) {
        let tick_due = self
            .last_tick_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.tick_interval_ms);
        if tick_due {
            self.last_tick_ms = Some(now_ms);
            self.supervisor.tick().await;
        }

        let refresh_due = self
            .last_refresh_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.position_refresh_ms);
        if refresh_due {
            self.last_refresh_ms = Some(now_ms);
            self.supervisor.refresh_positions().await;
        }
    }

    fn route_paper_events(&mut self) {
        for event in self.paper.drain_events() {
            if matches!(event.kind, OrderEventKind::Fill { .. }) {
                self.fills += 1;
            }
            if let Err(e) = self.supervisor.on_order_event(event) {
                warn!(error = %e, "Paper order event not routed");
            }
        }
    }

    /// Drain every controller and report what may still rest.
    pub async fn shutdown(&mut self) -> StopReport {
        self.route_paper_events();
        let report = self.supervisor.request_stop().await;
        // closes produced by the drain cancels
        let _ = self.paper.drain_events();
        report
    }

    pub fn summary(&self, stop: StopReport) -> RunSummary {
        RunSummary {
            records: self.records,
            fills: self.fills,
            stop,
        }
    }

    /// Replay `path` to the end (or until Ctrl-C), then drain.
    pub async fn run(mut self, path: impl AsRef<Path>) -> AppResult<RunSummary> {
        let path = path.as_ref();
        info!(path = %path.display(), "Starting replay");

        let mut reader = ReplayReader::open(path).await?;
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                record = reader.next_record() => {
                    match record? {
                        Some(record) => self.apply_record(record).await?,
                        None => {
                            info!(lines = reader.line_no(), records = self.records, "Replay finished");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.on_tick().await;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let stop = self.shutdown().await;
        let summary = self.summary(stop);
        info!(
            records = summary.records,
            fills = summary.fills,
            residual = summary.stop.residual_orders.len(),
            "Shutting down"
        );
        Ok(summary)
    }
}
