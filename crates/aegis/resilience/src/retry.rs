//! Retry mechanism with selectable backoff strategies.
//!
//! Re-invokes a failed operation under a bounded budget, cooperating
//! with an optional per-service circuit breaker and an adaptive
//! per-service model of recent success rates.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{BackoffStrategy, CircuitBreakerConfig, RetryConfig};
use crate::error::{ResilienceError, Result};

/// Successful result of a retried operation, with attempt bookkeeping.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The operation's result.
    pub value: T,

    /// Total invocations of the underlying operation (>= 1).
    pub attempts: u32,

    /// Delays slept before each retry; `delays.len() == attempts - 1`.
    pub delays: Vec<Duration>,
}

/// Rolling per-service model driving the adaptive backoff strategy.
///
/// Both fields are exponential moving averages with `EMA_ALPHA`.
#[derive(Debug, Clone, Copy)]
struct AdaptiveModel {
    /// Fraction of recent calls that eventually succeeded.
    success_rate: f64,

    /// Average number of retries recent calls needed.
    avg_retries: f64,
}

impl Default for AdaptiveModel {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_retries: 0.0,
        }
    }
}

const EMA_ALPHA: f64 = 0.3;

/// Success rate below which adaptive delays double.
const ADAPTIVE_SLOW_THRESHOLD: f64 = 0.3;

/// Success rate above which adaptive delays halve.
const ADAPTIVE_FAST_THRESHOLD: f64 = 0.7;

impl AdaptiveModel {
    fn observe(&mut self, success: bool, retries: u32) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (1.0 - EMA_ALPHA) * self.success_rate + EMA_ALPHA * outcome;
        self.avg_retries = (1.0 - EMA_ALPHA) * self.avg_retries + EMA_ALPHA * f64::from(retries);
    }
}

/// Retry executor holding per-service adaptive models and optional
/// per-service circuit breakers.
pub struct RetryMechanism {
    models: DashMap<String, AdaptiveModel>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl RetryMechanism {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Run `op(attempt)` up to `config.max_retries + 1` times.
    ///
    /// A retry happens only when the error is retryable, budget
    /// remains, and the per-service breaker (if enabled) still allows
    /// calls. Exhaustion returns
    /// [`ResilienceError::RetryExhausted`] carrying the full
    /// attempt/delay/error history; non-retryable errors propagate
    /// unchanged on first sight.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        service: &str,
        config: &RetryConfig,
        op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = config
            .enable_circuit_breaker
            .then(|| self.service_breaker(service, config));

        let mut delays: Vec<Duration> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for attempt in 0..=config.max_retries {
            if let Some(breaker) = &breaker {
                let (allowed, _) = breaker.allow_request();
                if !allowed {
                    self.observe(service, false, attempt);
                    return Err(ResilienceError::CircuitOpen(service.to_string()));
                }
            }

            match op(attempt).await {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    self.observe(service, true, attempt);
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt + 1,
                        delays,
                    });
                }
                Err(err) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }

                    if !err.is_retryable() {
                        debug!(
                            service = service,
                            attempt = attempt,
                            kind = %err.failure_kind(),
                            "Error is not retryable, propagating"
                        );
                        self.observe(service, false, attempt);
                        return Err(err);
                    }

                    if attempt == config.max_retries {
                        warn!(
                            service = service,
                            attempts = attempt + 1,
                            "Retry budget exhausted"
                        );
                        self.observe(service, false, attempt);
                        let last_kind = err.failure_kind();
                        let last_error = err.to_string();
                        errors.push(last_error.clone());
                        return Err(ResilienceError::RetryExhausted {
                            service: service.to_string(),
                            attempts: attempt + 1,
                            delays,
                            errors,
                            last_error,
                            last_kind,
                        });
                    }

                    errors.push(err.to_string());
                    let delay = self.delay_for_attempt(service, config, attempt);
                    debug!(
                        service = service,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        strategy = %config.strategy,
                        "Backing off before retry"
                    );
                    delays.push(delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // The loop always returns from its final iteration.
        Err(ResilienceError::Internal("retry loop exhausted".into()))
    }

    /// Delay before the retry that follows `attempt`, with jitter.
    fn delay_for_attempt(&self, service: &str, config: &RetryConfig, attempt: u32) -> Duration {
        let base = self.base_delay(service, config, attempt);

        if config.strategy == BackoffStrategy::Jitter {
            // Full jitter: uniform over [0, exponential(attempt)].
            let upper = base.as_millis().max(1) as u64;
            return Duration::from_millis(rand::thread_rng().gen_range(0..=upper));
        }

        // ±10% jitter to break retry synchronization.
        let base_ms = base.as_millis() as f64;
        let factor = rand::thread_rng().gen_range(-0.1..=0.1);
        Duration::from_millis((base_ms * (1.0 + factor)).max(0.0) as u64)
    }

    /// The strategy's delay before jitter is applied.
    fn base_delay(&self, service: &str, config: &RetryConfig, attempt: u32) -> Duration {
        let initial_ms = config.initial_delay.as_millis() as u64;
        let max_ms = config.max_delay.as_millis() as u64;

        let raw_ms = match config.strategy {
            BackoffStrategy::Exponential | BackoffStrategy::Jitter => {
                initial_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
            }
            BackoffStrategy::Linear => initial_ms.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Fibonacci => initial_ms.saturating_mul(fibonacci(attempt + 1)),
            BackoffStrategy::Adaptive => {
                let model = self
                    .models
                    .get(service)
                    .map(|entry| *entry.value())
                    .unwrap_or_default();

                let mut scaled = initial_ms as f64 * (1.0 + model.avg_retries);
                if model.success_rate < ADAPTIVE_SLOW_THRESHOLD {
                    scaled *= 2.0;
                } else if model.success_rate > ADAPTIVE_FAST_THRESHOLD {
                    scaled *= 0.5;
                }
                scaled.max(1.0) as u64
            }
        };

        Duration::from_millis(raw_ms.min(max_ms))
    }

    /// Update the per-service adaptive model after a terminal outcome.
    fn observe(&self, service: &str, success: bool, retries: u32) {
        self.models
            .entry(service.to_string())
            .or_default()
            .observe(success, retries);
    }

    /// Get or create the per-service breaker used between attempts.
    fn service_breaker(&self, service: &str, config: &RetryConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    service,
                    CircuitBreakerConfig {
                        failure_threshold: config.circuit_breaker_threshold,
                        // Closes after 3 consecutive half-open successes.
                        success_threshold: 3,
                        ..CircuitBreakerConfig::default()
                    },
                ))
            })
            .clone()
    }
}

impl Default for RetryMechanism {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterative Fibonacci; `fib(1) == fib(2) == 1`.
fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}
