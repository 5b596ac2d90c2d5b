//! Core domain types for the vibe-quant reduce-only exit executor.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Symbol`: Instrument identifier (e.g. `BTC/USDT:USDT`)
//! - `Price`, `Size`: Precision-safe numeric types
//! - `InstrumentLimits`: Exchange lot/tick constraints
//! - `PositionSide`, `OrderSide`, `OrderType`: Trading enums
//! - `ExecutionState`, `ExecutionMode`: Per-side controller lifecycle
//! - `Clock`: Injectable time source

pub mod clock;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod market;
pub mod order;
pub mod types;

pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{InstrumentLimits, Symbol};
pub use order::{ClientOrderId, OrderSide, OrderType, PositionSide, TimeInForce};
pub use types::{BookTicker, MarketEvent, Trade};

pub use execution::{
    ActiveOrder, ControllerKey, ExecutionMode, ExecutionState, FillId, OrderEvent, OrderEventKind,
    OrderStatus,
};
