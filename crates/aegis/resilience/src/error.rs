//! Error types for the aegis-resilience crate.
//!
//! Every failure path surfaced to callers goes through
//! [`ResilienceError`]; each variant maps to a typed
//! [`FailureKind`] so downstream policy (retry, healing) never has to
//! inspect error text.

use std::time::Duration;

use aegis_types::FailureKind;
use thiserror::Error;

/// Errors that can occur during resilient operation execution.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Operation exceeded its deadline.
    #[error("operation '{name}' timed out after {timeout:?}")]
    OperationTimeout { name: String, timeout: Duration },

    /// Circuit breaker short-circuited the call.
    #[error("circuit breaker open for operation '{0}'")]
    CircuitOpen(String),

    /// Bulkhead is at capacity with a full queue.
    #[error("bulkhead '{0}' full: concurrency limit reached and queue exhausted")]
    BulkheadFull(String),

    /// The safety gate rejected the operation description.
    #[error("safety validation failed: description matched denied keyword '{keyword}'")]
    SafetyValidationFailed { keyword: String },

    /// A healing action exceeded its own timeout.
    #[error("healing action for '{kind}' timed out after {timeout:?}")]
    HealingTimeout {
        kind: FailureKind,
        timeout: Duration,
    },

    /// All retry attempts were exhausted.
    #[error("retries exhausted for '{service}' after {attempts} attempts: {last_error}")]
    RetryExhausted {
        service: String,
        attempts: u32,
        delays: Vec<Duration>,
        errors: Vec<String>,
        last_error: String,
        last_kind: FailureKind,
    },

    /// Application-level failure passed through from the wrapped operation.
    #[error("operation failed ({kind}): {message}")]
    Operation { kind: FailureKind, message: String },

    /// Lookup of an unregistered bulkhead, strategy, or check.
    #[error("{entity} '{name}' is not registered")]
    NotRegistered {
        entity: &'static str,
        name: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResilienceError {
    /// Convenience constructor for application pass-through errors.
    pub fn operation(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Operation {
            kind,
            message: message.into(),
        }
    }

    /// Adapt a foreign error by classifying its text.
    ///
    /// Boundary helper only; internal code constructs errors with an
    /// explicit kind.
    pub fn from_foreign(err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        Self::Operation {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    /// The typed classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ResilienceError::OperationTimeout { .. } => FailureKind::Timeout,
            ResilienceError::CircuitOpen(_) => FailureKind::CircuitBreaker,
            ResilienceError::BulkheadFull(_) => FailureKind::RateLimit,
            ResilienceError::SafetyValidationFailed { .. } => FailureKind::Forbidden,
            ResilienceError::HealingTimeout { .. } => FailureKind::Timeout,
            ResilienceError::RetryExhausted { last_kind, .. } => *last_kind,
            ResilienceError::Operation { kind, .. } => *kind,
            ResilienceError::NotRegistered { .. } => FailureKind::NotFound,
            ResilienceError::Internal(_) => FailureKind::Unknown,
        }
    }

    /// Whether the retry layer may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }
}

/// Result type for resilience operations.
pub type Result<T> = std::result::Result<T, ResilienceError>;
