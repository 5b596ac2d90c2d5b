//! Signal error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, SignalError>;
