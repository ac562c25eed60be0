//! Orchestrator façade composing every resilience pattern.
//!
//! One entry point wraps an operation in (outermost first) the safety
//! gate, a circuit breaker, the retry layer, and a per-attempt
//! bulkhead and timeout. All managers are owned by the orchestrator
//! and dependency-injected into each other; there is no global state.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bulkhead::BulkheadManager;
use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
use crate::config::{CircuitBreakerConfig, OrchestratorConfig, RetryConfig};
use crate::context::OperationContext;
use crate::degradation::DegradationManager;
use crate::error::{ResilienceError, Result};
use crate::events::{EventBus, ResilienceEvent};
use crate::healing::SelfHealingManager;
use crate::health::HealthCheckManager;
use crate::metrics::{GlobalMetrics, MetricsSnapshot, SystemHealth};
use crate::retry::RetryMechanism;
use crate::safety::SafetyGate;
use crate::timeout::{TimeoutManager, TimeoutPolicy};

/// Per-call selection of resilience patterns.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    /// Guard the operation with a named circuit breaker.
    pub circuit_breaker: bool,

    /// Override the registry default for this operation's breaker.
    pub circuit_breaker_options: Option<CircuitBreakerConfig>,

    /// Retry transient failures.
    pub retry: bool,

    /// Override the orchestrator's default retry configuration.
    pub retry_options: Option<RetryConfig>,

    /// Run each attempt inside this named bulkhead pool.
    pub bulkhead: Option<String>,

    /// Deadline policy applied to each attempt.
    pub timeout: TimeoutPolicy,

    /// Consult the safety gate before running.
    pub safety_validation: bool,

    /// Spawn a healing attempt after a terminal failure.
    pub auto_healing: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: true,
            circuit_breaker_options: None,
            retry: true,
            retry_options: None,
            bulkhead: None,
            timeout: TimeoutPolicy::Auto,
            safety_validation: true,
            auto_healing: true,
        }
    }
}

/// A successful resilient operation plus its execution metadata.
#[derive(Debug)]
pub struct OperationResult<T> {
    pub value: T,

    /// Invocations of the underlying operation.
    pub attempts: u32,

    /// Wall-clock time including retries and queueing.
    pub duration: Duration,

    /// Patterns that were applied to this call.
    pub patterns: Vec<&'static str>,

    /// Whether the value came from the fallback.
    pub used_fallback: bool,
}

/// Central façade over the resilience managers.
pub struct ResilienceOrchestrator {
    config: OrchestratorConfig,
    events: EventBus,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: Arc<RetryMechanism>,
    bulkheads: Arc<BulkheadManager>,
    timeouts: Arc<TimeoutManager>,
    degradation: Arc<DegradationManager>,
    healing: Arc<SelfHealingManager>,
    health: Arc<HealthCheckManager>,
    safety: SafetyGate,
    metrics: Arc<GlobalMetrics>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ResilienceOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let events = EventBus::default();
        let degradation = Arc::new(DegradationManager::new(events.clone()));
        let healing = Arc::new(SelfHealingManager::new(
            config.healing.clone(),
            events.clone(),
        ));
        let health = Arc::new(
            HealthCheckManager::new(events.clone())
                .with_degradation(degradation.clone())
                .with_healing(healing.clone()),
        );
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            events.clone(),
        ));

        Self {
            config,
            events,
            breakers,
            retry: Arc::new(RetryMechanism::new()),
            bulkheads: Arc::new(BulkheadManager::new()),
            timeouts: Arc::new(TimeoutManager::new()),
            degradation,
            healing,
            health,
            safety: SafetyGate::new(),
            metrics: Arc::new(GlobalMetrics::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `op(attempt)` under the patterns selected in `config`.
    ///
    /// The terminal error is returned unchanged; auto-healing (when
    /// enabled and the failure kind is healable) runs out-of-band and
    /// never masks it.
    pub async fn execute_resilient_operation<T, F, Fut>(
        &self,
        name: &str,
        ctx: &OperationContext,
        config: &OperationConfig,
        op: F,
    ) -> Result<OperationResult<T>>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let patterns = Self::applied_patterns(config);

        match self.run_pipeline(name, ctx, config, &op).await {
            Ok((value, attempts)) => {
                Ok(self.finish_success(name, started, attempts, patterns, false, value))
            }
            Err(err) => {
                self.finish_failure(name, ctx, config, started, patterns, &err);
                Err(err)
            }
        }
    }

    /// Like [`execute_resilient_operation`](Self::execute_resilient_operation)
    /// but consults `fallback` when the guarded pipeline fails,
    /// including when the circuit is open. A fallback save counts as a
    /// fallback operation; a fallback failure surfaces the original
    /// error. Safety gate rejections propagate directly and never
    /// consult the fallback.
    pub async fn execute_with_fallback<T, F, Fut, FB>(
        &self,
        name: &str,
        ctx: &OperationContext,
        config: &OperationConfig,
        op: F,
        fallback: FB,
    ) -> Result<OperationResult<T>>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut patterns = Self::applied_patterns(config);

        match self.run_pipeline(name, ctx, config, &op).await {
            Ok((value, attempts)) => {
                Ok(self.finish_success(name, started, attempts, patterns, false, value))
            }
            Err(err) => {
                if matches!(err, ResilienceError::SafetyValidationFailed { .. }) {
                    self.record_terminal_failure(name, started, patterns, &err);
                    return Err(err);
                }
                debug!(
                    operation = name,
                    error = %err,
                    "Primary path failed, consulting fallback"
                );
                self.spawn_healing(ctx, config, &err);
                match fallback.await {
                    Ok(value) => {
                        patterns.push("fallback");
                        self.metrics.record_fallback();
                        self.events.emit(ResilienceEvent::OperationSucceeded {
                            name: name.to_string(),
                            duration: started.elapsed(),
                            attempts: 0,
                            patterns: patterns.clone(),
                        });
                        Ok(OperationResult {
                            value,
                            attempts: 0,
                            duration: started.elapsed(),
                            patterns,
                            used_fallback: true,
                        })
                    }
                    Err(fallback_err) => {
                        warn!(
                            operation = name,
                            error = %fallback_err,
                            "Fallback failed, surfacing original error"
                        );
                        self.record_terminal_failure(name, started, patterns, &err);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Safety gate, breaker admission, retry loop, and per-attempt
    /// bulkhead and timeout.
    async fn run_pipeline<T, F, Fut>(
        &self,
        name: &str,
        ctx: &OperationContext,
        config: &OperationConfig,
        op: &F,
    ) -> Result<(T, u32)>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if config.safety_validation {
            self.safety.validate(name, ctx)?;
        }

        let breaker = config.circuit_breaker.then(|| {
            self.breakers
                .breaker(name, config.circuit_breaker_options.clone())
        });

        if let Some(breaker) = &breaker {
            let (allowed, transition) = breaker.allow_request();
            self.breakers.publish_transition(name, transition);
            if !allowed {
                return Err(ResilienceError::CircuitOpen(name.to_string()));
            }
        }

        let run_attempt = |attempt: u32| {
            let inner = op(attempt);
            async move {
                let timed = self
                    .timeouts
                    .execute_with_timeout(name, config.timeout, ctx, inner);
                match &config.bulkhead {
                    Some(pool) => self.bulkheads.execute(pool, timed).await,
                    None => timed.await,
                }
            }
        };

        let outcome = if config.retry {
            let retry_config = config
                .retry_options
                .clone()
                .unwrap_or_else(|| self.config.retry.clone());
            self.retry
                .execute_with_retry(name, &retry_config, run_attempt)
                .await
                .map(|outcome| (outcome.value, outcome.attempts))
        } else {
            run_attempt(0).await.map(|value| (value, 1))
        };

        if let Some(breaker) = &breaker {
            let transition = match &outcome {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(),
            };
            self.breakers.publish_transition(name, transition);
        }

        outcome
    }

    fn finish_success<T>(
        &self,
        name: &str,
        started: Instant,
        attempts: u32,
        patterns: Vec<&'static str>,
        used_fallback: bool,
        value: T,
    ) -> OperationResult<T> {
        let duration = started.elapsed();
        self.metrics.record_success();
        self.events.emit(ResilienceEvent::OperationSucceeded {
            name: name.to_string(),
            duration,
            attempts,
            patterns: patterns.clone(),
        });
        OperationResult {
            value,
            attempts,
            duration,
            patterns,
            used_fallback,
        }
    }

    fn finish_failure(
        &self,
        name: &str,
        ctx: &OperationContext,
        config: &OperationConfig,
        started: Instant,
        patterns: Vec<&'static str>,
        err: &ResilienceError,
    ) {
        self.spawn_healing(ctx, config, err);
        self.record_terminal_failure(name, started, patterns, err);
    }

    fn record_terminal_failure(
        &self,
        name: &str,
        started: Instant,
        patterns: Vec<&'static str>,
        err: &ResilienceError,
    ) {
        self.metrics.record_failure();
        self.events.emit(ResilienceEvent::OperationFailed {
            name: name.to_string(),
            duration: started.elapsed(),
            kind: err.failure_kind(),
            error: err.to_string(),
            patterns,
        });
    }

    /// Spawn a deferred healing attempt for a healable failure kind.
    fn spawn_healing(&self, ctx: &OperationContext, config: &OperationConfig, err: &ResilienceError) {
        if !config.auto_healing {
            return;
        }
        let kind = err.failure_kind();
        if !kind.is_healable() {
            return;
        }

        let healing = self.healing.clone();
        let delay = self.config.healing.trigger_delay;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = healing.attempt_healing(kind, &ctx).await;
            debug!(kind = %kind, success = report.is_success(), "Auto-healing finished");
        });
    }

    fn applied_patterns(config: &OperationConfig) -> Vec<&'static str> {
        let mut patterns = Vec::new();
        if config.circuit_breaker {
            patterns.push("circuit_breaker");
        }
        if config.retry {
            patterns.push("retry");
        }
        if config.bulkhead.is_some() {
            patterns.push("bulkhead");
        }
        if config.timeout != TimeoutPolicy::Disabled {
            patterns.push("timeout");
        }
        patterns
    }

    /// Start background tasks: the periodic metrics emitter and the
    /// health check intervals.
    pub async fn start(&self) {
        let sources = self.snapshot_sources();
        let events = self.events.clone();
        let interval = self.config.metrics_interval;
        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                events.emit(ResilienceEvent::MetricsUpdate(sources.snapshot()));
            }
        }));
        drop(tasks);

        self.health.start().await;
        info!("Resilience orchestrator started");
    }

    /// Abort all background tasks.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        drop(tasks);

        self.health.stop().await;
        info!("Resilience orchestrator shut down");
    }

    /// Subscribe to the orchestrator's event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ResilienceEvent> {
        self.events.subscribe()
    }

    /// Coarse liveness summary.
    pub fn get_system_health(&self) -> SystemHealth {
        let open_circuits: Vec<String> = self
            .breakers
            .stats()
            .into_iter()
            .filter(|stats| stats.state == CircuitState::Open)
            .map(|stats| stats.name)
            .collect();
        let degraded_features: Vec<String> = self
            .degradation
            .feature_statuses()
            .into_iter()
            .filter(|status| !status.available)
            .map(|status| status.name)
            .collect();
        let degraded_checks: Vec<String> = self
            .health
            .statuses()
            .into_iter()
            .filter(|status| status.degraded)
            .map(|status| status.name)
            .collect();
        let system_degradation_level = self.degradation.metrics().system_level;

        SystemHealth {
            healthy: open_circuits.is_empty()
                && degraded_features.is_empty()
                && degraded_checks.is_empty()
                && !system_degradation_level.is_degraded(),
            system_degradation_level,
            open_circuits,
            degraded_features,
            degraded_checks,
            timestamp: Utc::now(),
        }
    }

    /// Full point-in-time metrics across every manager.
    pub fn get_comprehensive_metrics(&self) -> MetricsSnapshot {
        self.snapshot_sources().snapshot()
    }

    fn snapshot_sources(&self) -> SnapshotSources {
        SnapshotSources {
            metrics: self.metrics.clone(),
            breakers: self.breakers.clone(),
            bulkheads: self.bulkheads.clone(),
            timeouts: self.timeouts.clone(),
            degradation: self.degradation.clone(),
            healing: self.healing.clone(),
            health: self.health.clone(),
        }
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn bulkheads(&self) -> &BulkheadManager {
        &self.bulkheads
    }

    pub fn timeouts(&self) -> &TimeoutManager {
        &self.timeouts
    }

    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    pub fn healing(&self) -> &Arc<SelfHealingManager> {
        &self.healing
    }

    pub fn health(&self) -> &Arc<HealthCheckManager> {
        &self.health
    }
}

impl Default for ResilienceOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

/// Manager handles captured by the periodic metrics task.
struct SnapshotSources {
    metrics: Arc<GlobalMetrics>,
    breakers: Arc<CircuitBreakerRegistry>,
    bulkheads: Arc<BulkheadManager>,
    timeouts: Arc<TimeoutManager>,
    degradation: Arc<DegradationManager>,
    healing: Arc<SelfHealingManager>,
    health: Arc<HealthCheckManager>,
}

impl SnapshotSources {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            operations: self.metrics.counters(),
            circuit_breakers: self.breakers.stats(),
            bulkheads: self.bulkheads.stats(),
            timeouts: self.timeouts.stats(),
            degradation: self.degradation.metrics(),
            healing: self.healing.metrics(),
            health_checks: self.health.statuses(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::FailureKind;
    use crate::config::{BackoffStrategy, BulkheadConfig, HealingStrategyConfig};
    use crate::healing::healing_fn;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            strategy: BackoffStrategy::Exponential,
            enable_circuit_breaker: false,
            circuit_breaker_threshold: 5,
        }
    }

    fn plain_config() -> OperationConfig {
        OperationConfig {
            retry_options: Some(fast_retry(3)),
            ..OperationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_operation_records_metrics() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();

        let result = orchestrator
            .execute_resilient_operation("fetch", &ctx, &plain_config(), |_| async { Ok(11) })
            .await
            .unwrap();

        assert_eq!(result.value, 11);
        assert_eq!(result.attempts, 1);
        assert!(!result.used_fallback);
        assert!(result.patterns.contains(&"circuit_breaker"));
        assert!(result.patterns.contains(&"retry"));

        let counters = orchestrator.get_comprehensive_metrics().operations;
        assert_eq!(counters.total_operations, 1);
        assert_eq!(counters.successful_operations, 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();
        let calls = AtomicU32::new(0);

        let result = orchestrator
            .execute_resilient_operation("flaky", &ctx, &plain_config(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ResilienceError::operation(
                            FailureKind::Connection,
                            "connection reset",
                        ))
                    } else {
                        Ok("up")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, "up");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_safety_gate_blocks_destructive_description() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new().with_description("drop the staging schema");
        let calls = AtomicU32::new(0);

        let result = orchestrator
            .execute_resilient_operation("maintenance", &ctx, &plain_config(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::SafetyValidationFailed { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let counters = orchestrator.get_comprehensive_metrics().operations;
        assert_eq!(counters.failed_operations, 1);
    }

    #[tokio::test]
    async fn test_operation_name_with_gate_keyword_runs() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new().with_description("render the monthly report");

        let result = orchestrator
            .execute_resilient_operation("execute_report", &ctx, &plain_config(), |_| async {
                Ok("rendered")
            })
            .await
            .unwrap();

        assert_eq!(result.value, "rendered");
    }

    #[tokio::test]
    async fn test_fallback_never_masks_safety_rejection() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new().with_description("drop all user tables");
        let fallback_ran = AtomicU32::new(0);

        let result: Result<OperationResult<&str>> = orchestrator
            .execute_with_fallback(
                "maintenance",
                &ctx,
                &plain_config(),
                |_| async { Ok("live") },
                async {
                    fallback_ran.fetch_add(1, Ordering::SeqCst);
                    Ok("cached")
                },
            )
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::SafetyValidationFailed { .. }
        ));
        assert_eq!(fallback_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();
        let config = OperationConfig {
            retry: false,
            ..OperationConfig::default()
        };

        orchestrator
            .circuit_breakers()
            .breaker("payments", None)
            .force_state(CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = orchestrator
            .execute_resilient_operation("payments", &ctx, &config, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result.unwrap_err(), ResilienceError::CircuitOpen(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_saves_open_circuit() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();
        let config = OperationConfig {
            retry: false,
            ..OperationConfig::default()
        };

        orchestrator
            .circuit_breakers()
            .breaker("catalog", None)
            .force_state(CircuitState::Open);

        let result = orchestrator
            .execute_with_fallback(
                "catalog",
                &ctx,
                &config,
                |_| async { Ok("live") },
                async { Ok("cached") },
            )
            .await
            .unwrap();

        assert_eq!(result.value, "cached");
        assert!(result.used_fallback);
        assert!(result.patterns.contains(&"fallback"));

        let counters = orchestrator.get_comprehensive_metrics().operations;
        assert_eq!(counters.fallback_operations, 1);
        assert_eq!(counters.successful_operations, 1);
    }

    #[tokio::test]
    async fn test_failed_fallback_surfaces_original_error() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();
        let config = OperationConfig {
            retry_options: Some(fast_retry(0)),
            ..OperationConfig::default()
        };

        let result: Result<OperationResult<()>> = orchestrator
            .execute_with_fallback(
                "inventory",
                &ctx,
                &config,
                |_| async {
                    Err(ResilienceError::operation(
                        FailureKind::Connection,
                        "primary down",
                    ))
                },
                async {
                    Err(ResilienceError::operation(
                        FailureKind::Connection,
                        "replica down",
                    ))
                },
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("primary down"));
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_applies() {
        let orchestrator = ResilienceOrchestrator::default();
        let ctx = OperationContext::new();
        let config = OperationConfig {
            retry: false,
            circuit_breaker: false,
            timeout: TimeoutPolicy::Fixed(Duration::from_millis(20)),
            ..OperationConfig::default()
        };

        let result: Result<OperationResult<()>> = orchestrator
            .execute_resilient_operation("slow", &ctx, &config, |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::OperationTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_bulkhead_pool_is_entered() {
        let orchestrator = ResilienceOrchestrator::default();
        orchestrator.bulkheads().create_bulkhead(
            "db",
            BulkheadConfig {
                max_concurrency: 2,
                max_queue_size: 1,
                timeout: Duration::from_secs(1),
            },
        );
        let ctx = OperationContext::new();
        let config = OperationConfig {
            bulkhead: Some("db".to_string()),
            retry: false,
            ..OperationConfig::default()
        };

        let result = orchestrator
            .execute_resilient_operation("query", &ctx, &config, |_| async { Ok(1) })
            .await
            .unwrap();

        assert_eq!(result.value, 1);
        let stats = orchestrator.bulkheads().stats();
        assert_eq!(stats[0].total_accepted, 1);
    }

    #[tokio::test]
    async fn test_auto_healing_triggered_by_failure() {
        let orchestrator = ResilienceOrchestrator::default();
        let healed = Arc::new(AtomicU32::new(0));
        let healed_in_fn = healed.clone();
        orchestrator.healing().register_strategy(
            FailureKind::Connection,
            healing_fn(move |_ctx| {
                healed_in_fn.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
            HealingStrategyConfig {
                cooldown_period: Duration::ZERO,
                ..HealingStrategyConfig::default()
            },
        );

        let ctx = OperationContext::new();
        let config = OperationConfig {
            retry_options: Some(fast_retry(0)),
            ..OperationConfig::default()
        };
        let result: Result<OperationResult<()>> = orchestrator
            .execute_resilient_operation("linkcheck", &ctx, &config, |_| async {
                Err(ResilienceError::operation(
                    FailureKind::Connection,
                    "connection refused",
                ))
            })
            .await;
        assert!(result.is_err());

        // Healing fires after the configured trigger delay.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(healed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_system_health_reflects_open_circuit() {
        let orchestrator = ResilienceOrchestrator::default();
        assert!(orchestrator.get_system_health().healthy);

        orchestrator
            .circuit_breakers()
            .breaker("billing", None)
            .force_state(CircuitState::Open);

        let health = orchestrator.get_system_health();
        assert!(!health.healthy);
        assert_eq!(health.open_circuits, vec!["billing".to_string()]);
    }

    #[tokio::test]
    async fn test_events_emitted_for_outcomes() {
        let orchestrator = ResilienceOrchestrator::default();
        let mut rx = orchestrator.subscribe();
        let ctx = OperationContext::new();

        orchestrator
            .execute_resilient_operation("ping", &ctx, &plain_config(), |_| async { Ok(()) })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ResilienceEvent::OperationSucceeded { name, attempts, .. } => {
                assert_eq!(name, "ping");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let orchestrator = ResilienceOrchestrator::default();
        orchestrator.start().await;
        orchestrator.shutdown().await;
    }
}
