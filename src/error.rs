//! Error types and error-kind classification.
//!
//! Every error that crosses a retry or circuit boundary carries an [`ErrorKind`]
//! assigned where the error is created. Retry policies match on the kind, never
//! on the concrete error type or its message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Operation exceeded its deadline
    Timeout,
    /// Could not establish or lost a connection
    Connection,
    /// Transport-level network failure
    Network,
    /// Transaction aborted by a lock conflict
    Deadlock,
    /// Dependency reported itself unavailable
    Unavailable,
    /// Dependency asked us to slow down
    RateLimited,
    /// Rejected by an open circuit breaker without being attempted
    CircuitOpen,
    /// One or more event subscribers failed
    SubscriberFailed,
    /// Input or business rule violation
    Validation,
    /// Conflicting concurrent modification
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable tag used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Network => "network",
            ErrorKind::Deadlock => "deadlock",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::SubscriberFailed => "subscriber_failed",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Kinds that usually clear up on their own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Connection
                | ErrorKind::Network
                | ErrorKind::Deadlock
                | ErrorKind::Unavailable
                | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know their own [`ErrorKind`]
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}

/// General purpose error for callers that don't carry their own error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ResilienceError {
    kind: ErrorKind,
    message: String,
}

impl ResilienceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Deadlock, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for ResilienceError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(error: serde_json::Error) -> Self {
        ResilienceError::validation(format!("JSON serialization error: {error}"))
    }
}

impl From<tokio::time::error::Elapsed> for ResilienceError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        ResilienceError::timeout(error.to_string())
    }
}

pub type ResilienceResult<T> = Result<T, ResilienceError>;
