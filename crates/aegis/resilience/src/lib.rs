//! Resilience orchestration for async services.
//!
//! Composable implementations of the classic resilience patterns,
//! coordinated by a single orchestrator façade:
//!
//! - [`circuit_breaker`]: per-operation closed/open/half-open state
//!   machines with a lazy reset timeout
//! - [`retry`]: bounded retries with exponential, linear, fibonacci,
//!   full-jitter, and adaptive backoff
//! - [`bulkhead`]: named concurrency pools with bounded queues
//! - [`timeout`]: deadline racing with tiered defaults inferred from
//!   the operation description
//! - [`degradation`]: per-feature and system-wide degradation levels
//!   with async hooks
//! - [`healing`]: automated remediation keyed by typed failure kind
//! - [`health`]: periodic probes driving degradation and healing
//!
//! Everything is dependency-injected; construct a
//! [`ResilienceOrchestrator`] and share it via `Arc`.
//!
//! ```no_run
//! use aegis_resilience::{
//!     OperationConfig, OperationContext, ResilienceOrchestrator, Result,
//! };
//!
//! # async fn demo() -> Result<()> {
//! let orchestrator = ResilienceOrchestrator::default();
//! let ctx = OperationContext::new().with_description("fetch user profile");
//!
//! let result = orchestrator
//!     .execute_resilient_operation("fetch_profile", &ctx, &OperationConfig::default(), |_| async {
//!         Ok("profile")
//!     })
//!     .await?;
//! assert_eq!(result.value, "profile");
//! # Ok(())
//! # }
//! ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod degradation;
pub mod error;
pub mod events;
pub mod healing;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod safety;
pub mod timeout;

pub use bulkhead::{Bulkhead, BulkheadManager, BulkheadStats};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState,
};
pub use config::{
    BackoffStrategy, BulkheadConfig, CircuitBreakerConfig, HealingConfig, HealingStrategyConfig,
    HealthCheckConfig, OrchestratorConfig, RetryConfig, TimeoutCategory,
};
pub use context::OperationContext;
pub use degradation::{DegradationHooks, DegradationManager, FeatureStatus, NoOpHooks};
pub use error::{ResilienceError, Result};
pub use events::{EventBus, ResilienceEvent};
pub use healing::{
    healing_fn, HealingAction, HealingRecord, HealingRefusal, HealingReport, SelfHealingManager,
};
pub use health::{probe_fn, HealthCheckManager, HealthCheckStatus, HealthProbe, ProbeReport};
pub use metrics::{GlobalMetrics, MetricsSnapshot, OperationCounters, SystemHealth};
pub use orchestrator::{OperationConfig, OperationResult, ResilienceOrchestrator};
pub use retry::{RetryMechanism, RetryOutcome};
pub use safety::SafetyGate;
pub use timeout::{TimeoutManager, TimeoutPolicy};

pub use aegis_types::{DegradationLevel, FailureKind, HealingAttemptId, OperationId};
