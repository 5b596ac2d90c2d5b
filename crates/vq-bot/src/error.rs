//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Replay error at line {line}: {message}")]
    Replay { line: usize, message: String },

    #[error("Executor error: {0}")]
    Executor(#[from] vq_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vq_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
