//! Typed failure classification.
//!
//! Every error surfaced by the resilience layer carries a
//! [`FailureKind`] so that retry policies and healing strategies
//! dispatch on a structured kind rather than matching error text.

use serde::{Deserialize, Serialize};

/// Structured classification of an operation failure.
///
/// Drives two decisions: whether the retry layer may re-attempt the
/// operation, and which self-healing strategy (if any) is triggered
/// after the failure has been reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Operation exceeded its deadline.
    Timeout,

    /// Connection-level failure (refused, reset, unreachable).
    Connection,

    /// Memory pressure or allocation failure.
    Memory,

    /// Rate limit or quota exhaustion, including bulkhead rejection.
    RateLimit,

    /// A circuit breaker short-circuited the call.
    CircuitBreaker,

    /// Authentication is missing or expired.
    Unauthorized,

    /// Authenticated but not permitted.
    Forbidden,

    /// The target resource does not exist.
    NotFound,

    /// The request itself is malformed.
    BadRequest,

    /// Credentials were rejected.
    InvalidCredentials,

    /// Unclassified failure.
    #[default]
    Unknown,
}

impl FailureKind {
    /// Whether the retry layer is allowed to re-attempt an operation
    /// that failed with this kind.
    ///
    /// Client-side errors (auth, permissions, missing resources,
    /// malformed requests) will fail identically on every attempt, so
    /// retrying them only wastes budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FailureKind::Unauthorized
                | FailureKind::Forbidden
                | FailureKind::NotFound
                | FailureKind::BadRequest
                | FailureKind::InvalidCredentials
        )
    }

    /// Whether a self-healing strategy lookup makes sense for this kind.
    ///
    /// Non-retryable client errors are not heal-able either; healing a
    /// `NotFound` cannot make the resource appear.
    pub fn is_healable(&self) -> bool {
        self.is_retryable()
    }

    /// Best-effort classification of foreign error text.
    ///
    /// Only for adapting errors from outside the resilience layer at
    /// the API boundary; internal components always construct errors
    /// with an explicit kind.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("unauthorized") || lower.contains("401") {
            FailureKind::Unauthorized
        } else if lower.contains("forbidden") || lower.contains("403") {
            FailureKind::Forbidden
        } else if lower.contains("not found") || lower.contains("404") {
            FailureKind::NotFound
        } else if lower.contains("bad request") || lower.contains("400") {
            FailureKind::BadRequest
        } else if lower.contains("invalid credentials") {
            FailureKind::InvalidCredentials
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailureKind::Timeout
        } else if lower.contains("connection")
            || lower.contains("refused")
            || lower.contains("unreachable")
            || lower.contains("reset")
        {
            FailureKind::Connection
        } else if lower.contains("memory") || lower.contains("allocation") {
            FailureKind::Memory
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            FailureKind::RateLimit
        } else if lower.contains("circuit") {
            FailureKind::CircuitBreaker
        } else {
            FailureKind::Unknown
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout_failure"),
            FailureKind::Connection => write!(f, "connection_failure"),
            FailureKind::Memory => write!(f, "memory_pressure"),
            FailureKind::RateLimit => write!(f, "rate_limit_exceeded"),
            FailureKind::CircuitBreaker => write!(f, "circuit_breaker_failure"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::Forbidden => write!(f, "forbidden"),
            FailureKind::NotFound => write!(f, "not_found"),
            FailureKind::BadRequest => write!(f, "bad_request"),
            FailureKind::InvalidCredentials => write!(f, "invalid_credentials"),
            FailureKind::Unknown => write!(f, "unknown_failure"),
        }
    }
}
