//! Controller worker task.
//!
//! Each controller runs on its own task, so every read and write of its
//! context happens on one logical sequence. A slow gateway call only
//! stalls that controller.
//!
//! Two queues feed the task:
//! - control (unbounded, FIFO): order events, position reports, settings,
//!   stop. Never dropped, and sending never waits on the worker.
//! - hints (bounded): market and tick polls. Dropped when full, since a
//!   queued poll already sees the latest snapshot.
//!
//! Control messages are served first.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vq_core::{ControllerKey, ExecutionState, OrderEvent};

use crate::config::SymbolSettings;
use crate::context::ControllerStatus;
use crate::controller::{DrainReport, ExecutionController};
use crate::error::{ExecutorError, ExecutorResult};
use crate::gateway::PositionReport;

/// Message routed to one controller.
#[derive(Debug)]
pub enum ControllerMsg {
    /// Snapshot for the instrument changed.
    Market { now_ms: u64 },
    /// Periodic timer pass.
    Tick { now_ms: u64 },
    Order { event: OrderEvent, now_ms: u64 },
    Position { report: PositionReport, now_ms: u64 },
    Settings(Arc<SymbolSettings>),
    /// Drain and exit.
    Stop {
        now_ms: u64,
        reply: oneshot::Sender<DrainReport>,
    },
}

/// Supervisor-side handle of a running controller.
#[derive(Debug)]
pub struct WorkerHandle {
    pub key: ControllerKey,
    control_tx: mpsc::UnboundedSender<ControllerMsg>,
    hint_tx: mpsc::Sender<ControllerMsg>,
    status: Arc<RwLock<ControllerStatus>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Queue a message that must not be lost (order events, position
    /// reports, settings, stop). Returns immediately even while the worker
    /// is inside a gateway call.
    pub fn send(&self, msg: ControllerMsg) -> ExecutorResult<()> {
        self.control_tx
            .send(msg)
            .map_err(|_| ExecutorError::ChannelClosed)
    }

    /// Queue a poll hint without waiting. A full queue already holds a
    /// pending pass that will see the latest snapshot, so the hint is
    /// dropped.
    pub fn nudge(&self, msg: ControllerMsg) -> bool {
        match self.hint_tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to end; `Err` if it panicked.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Spawn the worker for `controller`. The key is sent on `done_tx` when
/// the controller reaches DONE.
pub fn spawn_worker(
    controller: ExecutionController,
    queue_capacity: usize,
    done_tx: mpsc::UnboundedSender<ControllerKey>,
) -> WorkerHandle {
    let key = controller.key().clone();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (hint_tx, hint_rx) = mpsc::channel(queue_capacity.max(1));
    let status = Arc::new(RwLock::new(controller.status()));
    let join = tokio::spawn(run_worker(
        controller,
        control_rx,
        hint_rx,
        Arc::clone(&status),
        done_tx,
    ));
    WorkerHandle {
        key,
        control_tx,
        hint_tx,
        status,
        join,
    }
}

async fn run_worker(
    mut controller: ExecutionController,
    mut control_rx: mpsc::UnboundedReceiver<ControllerMsg>,
    mut hint_rx: mpsc::Receiver<ControllerMsg>,
    status: Arc<RwLock<ControllerStatus>>,
    done_tx: mpsc::UnboundedSender<ControllerKey>,
) {
    let key = controller.key().clone();
    debug!(%key, "Controller worker started");

    loop {
        let msg = tokio::select! {
            biased;
            msg = control_rx.recv() => match msg {
                Some(msg) => msg,
                // handle dropped
                None => return,
            },
            Some(msg) = hint_rx.recv() => msg,
        };
        let result = match msg {
            ControllerMsg::Market { now_ms } | ControllerMsg::Tick { now_ms } => {
                controller.poll(now_ms).await
            }
            ControllerMsg::Order { event, now_ms } => {
                controller.on_order_event(&event, now_ms).await
            }
            ControllerMsg::Position { report, now_ms } => {
                controller.on_position(&report, now_ms).await
            }
            ControllerMsg::Settings(settings) => {
                controller.update_settings(settings);
                Ok(())
            }
            ControllerMsg::Stop { now_ms, reply } => {
                let report = controller.drain(now_ms).await;
                *status.write() = controller.status();
                let _ = reply.send(report);
                info!(%key, "Controller worker stopped");
                return;
            }
        };

        if let Err(e) = result {
            warn!(%key, error = %e, state = %controller.state(), "Controller step failed");
        }
        *status.write() = controller.status();

        if controller.state() == ExecutionState::Done {
            let _ = done_tx.send(key.clone());
            debug!(%key, "Controller worker finished");
            return;
        }
    }
}
