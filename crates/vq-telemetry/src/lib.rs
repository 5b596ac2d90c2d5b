//! Prometheus metrics and structured logging.
//!
//! - Structured logging with `tracing` (JSON in production, pretty otherwise)
//! - Prometheus counters and gauges for order flow, mode rotation and risk
//!   blocks

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
