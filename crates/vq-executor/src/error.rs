//! Executor error types.

use thiserror::Error;
use vq_core::{ControllerKey, ExecutionState, Size};

use crate::transition::Trigger;

/// Failure reported by an [`ExchangeGateway`](crate::gateway::ExchangeGateway) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Exchange refused the request (post-only would cross, margin, ...).
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Rate limited by exchange")]
    RateLimited,

    /// No answer in time; the request may or may not have been applied.
    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
        }
    }

    /// Outcome unknown: the request may have reached the exchange.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Placement rejected: {0}")]
    PlacementRejected(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Gateway timeout")]
    GatewayTimeout,

    #[error("Stale market data")]
    StaleMarketData,

    #[error("Data inconsistency on {key}: local {local}, gateway {reported}")]
    DataInconsistency {
        key: ControllerKey,
        local: Size,
        reported: Size,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Controller channel closed")]
    ChannelClosed,

    #[error("Invalid transition from {from} on {trigger:?}")]
    InvalidTransition {
        from: ExecutionState,
        trigger: Trigger,
    },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<GatewayError> for ExecutorError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rejected(reason) => Self::PlacementRejected(reason),
            GatewayError::RateLimited => Self::RateLimited,
            GatewayError::Timeout => Self::GatewayTimeout,
            GatewayError::Transport(msg) => Self::Transport(msg),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
