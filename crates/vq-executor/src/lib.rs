//! Reduce-only exit execution.
//!
//! One [`ExecutionController`] per (instrument, position side) drives the
//! remaining quantity to zero through a small lifecycle:
//!
//! ```text
//! IDLE -> PLACE -> WAIT -> (fill) -> IDLE
//!                      -> (ttl)  -> CANCEL -> COOLDOWN -> IDLE
//! any live state -> DONE once the remainder rounds to zero
//! ```
//!
//! # Key Components
//!
//! - [`Supervisor`]: Creates, routes to and drains controllers
//! - [`ExecutionController`]: Per-side state machine on its own worker task
//! - [`PositionSideContext`]: Remaining quantity, mode, active order, counters
//! - [`size`]: Slice sizing under lot, minimum and notional constraints
//! - [`quote`]: Maker / aggressive limit price selection
//! - [`ExchangeGateway`]: Async boundary to the exchange
//!
//! # Placement Gates (in `ExecutionController::poll`)
//!
//! 1. Risk guard (staleness, liquidation, rate budget) -> blocked
//! 2. Signal trigger or liquidation force -> otherwise idle
//! 3. Throttle (skipped when forced)
//! 4. Sizer -> Complete / NotOrderable / Order
//! 5. Quote from the current book
//! 6. Rate slot -> place with stable client order ID

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod pricing;
pub mod sizer;
pub mod supervisor;
pub mod transition;
pub mod worker;

pub use config::{ExecutionSettings, MakerPriceMode, SymbolSettings};
pub use context::{
    ControllerStatus, FillOutcome, PositionSideContext, Reconciliation, Rotation, RotationCounters,
};
pub use controller::{DrainReport, ExecutionController};
pub use error::{ExecutorError, ExecutorResult, GatewayError};
pub use gateway::{
    BoxFuture, CancelOutcome, DynGateway, ExchangeGateway, GatewayResult, MockGateway,
    OrderReport, PlaceOrderAck, PlaceOrderRequest, PositionReport, StopOrderRequest,
};
pub use pricing::{quote, Quote};
pub use sizer::{size, NotOrderable, SizeDecision};
pub use supervisor::{StopReport, Supervisor, SupervisorConfig};
pub use transition::{next_state, Trigger};
pub use worker::{spawn_worker, ControllerMsg, WorkerHandle};
