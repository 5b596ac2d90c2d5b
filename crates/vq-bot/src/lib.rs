//! vibe-quant reduce-only exit executor.
//!
//! Application that wires the components together:
//! - Configuration loading with per-instrument overrides
//! - Feed replay from JSONL
//! - Paper exchange gateway
//! - Supervisor run loop with bounded drain on stop

pub mod app;
pub mod config;
pub mod error;
pub mod paper;
pub mod replay;

pub use app::{Application, RunSummary};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use paper::PaperGateway;
pub use replay::{parse_line, ReplayReader, ReplayRecord};
