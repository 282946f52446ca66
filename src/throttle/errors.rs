//! # Throttle Errors
//!
//! Rejections are terminal for the current request. The throttle never
//! retries internally; callers get a `Retry-After` hint when one is configured.

use thiserror::Error;

use crate::config_validator::{format_validation_errors, ConfigValidationError};

/// Result type for throttle construction
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Reason a request was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No room right now: global backlog exhausted, tenant queue full, or the
    /// caller was already gone when the request arrived.
    #[error("Server capacity exceeded.")]
    CapacityExceeded { context_done: bool },

    /// Waited in the tenant queue longer than the backlog timeout
    #[error("Timed out while waiting for a pending request to complete.")]
    Timeout,

    /// Caller cancelled while the request was queued
    #[error("Context was canceled.")]
    ContextCanceled,
}

impl Rejection {
    /// Whether the caller's context had ended. Drives the retry-after hint.
    pub fn context_done(&self) -> bool {
        match self {
            Rejection::CapacityExceeded { context_done } => *context_done,
            Rejection::Timeout => false,
            Rejection::ContextCanceled => true,
        }
    }

    /// Stable code for API responses and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Rejection::Timeout => "QUEUE_TIMEOUT",
            Rejection::ContextCanceled => "CONTEXT_CANCELED",
        }
    }

    /// Every rejection is surfaced as 429 Too Many Requests
    pub fn status_code(&self) -> u16 {
        429
    }
}

/// Fatal construction errors
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Invalid throttle configuration:\n{}", format_validation_errors(.0))]
    InvalidConfig(Vec<ConfigValidationError>),
}

impl ThrottleError {
    pub fn code(&self) -> &'static str {
        match self {
            ThrottleError::InvalidConfig(_) => "INVALID_THROTTLE_CONFIG",
        }
    }
}
