//! Error types
//!
//! `BackendError` is produced at the HTTP boundary and is `Clone` because a
//! coalesced text analysis hands the same outcome to every waiting caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("HTTP {status}: {status_text}")]
    Transport { status: u16, status_text: String },

    #[error("{message}")]
    Backend { message: String },

    #[error("Failed to reach backend: {0}")]
    Connect(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Timeout { .. } => ErrorKind::Timeout,
            BackendError::Transport { .. } => ErrorKind::TransportError,
            BackendError::Backend { .. } => ErrorKind::BackendError,
            BackendError::Connect(_) => ErrorKind::TransportError,
            BackendError::Decode(_) => ErrorKind::BackendError,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TrustMeterError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Unknown message type: {0}")]
    UnknownRequestType(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrustMeterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustMeterError::InvalidInput(_) => ErrorKind::InvalidInput,
            TrustMeterError::UnknownRequestType(_) => ErrorKind::UnknownRequestType,
            TrustMeterError::Backend(e) => e.kind(),
            TrustMeterError::Config(_) | TrustMeterError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Wire-level classification carried in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    Timeout,
    TransportError,
    BackendError,
    UnknownRequestType,
    Internal,
}

pub type TrustMeterResult<T> = Result<T, TrustMeterError>;
pub type BackendResult<T> = Result<T, BackendError>;
