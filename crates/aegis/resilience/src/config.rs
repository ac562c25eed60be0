//! Configuration for the resilience orchestration layer.
//!
//! Defines configuration for circuit breakers, retries, bulkheads,
//! timeouts, self-healing, and health checks, with defaults suitable
//! for most deployments.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures to open the circuit.
    pub failure_threshold: u32,

    /// Number of successes in half-open to close the circuit.
    pub success_threshold: u32,

    /// Time to wait before transitioning from open to half-open.
    pub reset_timeout: Duration,

    /// Maximum requests allowed in half-open state.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_max_requests: 3,
        }
    }
}

/// Backoff strategy for computing retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `min(initial_delay * 2^attempt, max_delay)`.
    #[default]
    Exponential,

    /// `min(initial_delay * (attempt + 1), max_delay)`.
    Linear,

    /// `min(initial_delay * fib(attempt + 1), max_delay)`.
    Fibonacci,

    /// Full jitter: uniform random in `[0, exponential(attempt)]`.
    Jitter,

    /// Delay derived from the per-service rolling success rate and
    /// average retry count.
    Adaptive,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffStrategy::Exponential => write!(f, "exponential"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Fibonacci => write!(f, "fibonacci"),
            BackoffStrategy::Jitter => write!(f, "jitter"),
            BackoffStrategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Retry mechanism configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,

    /// Base delay for the first retry.
    pub initial_delay: Duration,

    /// Cap applied to every computed delay.
    pub max_delay: Duration,

    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Whether to consult a per-service circuit breaker between
    /// attempts.
    pub enable_circuit_breaker: bool,

    /// Consecutive failures before the per-service breaker opens.
    pub circuit_breaker_threshold: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
            enable_circuit_breaker: false,
            circuit_breaker_threshold: 5,
        }
    }
}

/// Configuration for a named bulkhead pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Maximum concurrent executions admitted into the pool.
    pub max_concurrency: usize,

    /// Maximum calls waiting for a slot before immediate rejection.
    pub max_queue_size: usize,

    /// Deadline applied to each admitted call.
    pub timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_queue_size: 20,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Named timeout tiers for operations without an explicit deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCategory {
    /// 5 seconds; quick lookups.
    Short,

    /// 30 seconds; the general case.
    #[default]
    Default,

    /// 30 seconds; database and network calls.
    Medium,

    /// 120 seconds; analysis and processing work.
    Long,

    /// 300 seconds; installs, deploys, migrations.
    Extended,
}

impl TimeoutCategory {
    /// The deadline this tier maps to.
    pub fn duration(&self) -> Duration {
        match self {
            TimeoutCategory::Short => Duration::from_secs(5),
            TimeoutCategory::Default | TimeoutCategory::Medium => Duration::from_secs(30),
            TimeoutCategory::Long => Duration::from_secs(120),
            TimeoutCategory::Extended => Duration::from_secs(300),
        }
    }

    /// Infer a tier from an operation description.
    ///
    /// Keyword heuristics: database/network work gets [`Medium`](Self::Medium),
    /// analysis gets [`Long`](Self::Long), installs and deploys get
    /// [`Extended`](Self::Extended).
    pub fn infer(description: &str) -> Self {
        let lower = description.to_lowercase();

        if ["install", "deploy", "migrate", "provision"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            TimeoutCategory::Extended
        } else if ["analyze", "process", "generate", "train"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            TimeoutCategory::Long
        } else if ["database", "query", "network", "api", "fetch"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            TimeoutCategory::Medium
        } else {
            TimeoutCategory::Default
        }
    }
}

/// Configuration for one self-healing strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingStrategyConfig {
    /// Priority relative to other strategies (higher = more urgent).
    pub priority: u32,

    /// Minimum time between attempts for this strategy.
    pub cooldown_period: Duration,

    /// Maximum consecutive failed attempts before the strategy is
    /// benched until a success resets the budget.
    pub max_attempts: u32,

    /// Deadline for one healing action run.
    pub timeout: Duration,
}

impl Default for HealingStrategyConfig {
    fn default() -> Self {
        Self {
            priority: 1,
            cooldown_period: Duration::from_secs(60),
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the self-healing manager as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Maximum healing actions running at once across all strategies.
    pub max_concurrent_healing: usize,

    /// Maximum entries retained in the healing history.
    pub max_history: usize,

    /// Delay before auto-healing is triggered after a failure.
    pub trigger_delay: Duration,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_healing: 3,
            max_history: 100,
            trigger_delay: Duration::from_millis(100),
        }
    }
}

/// Configuration for one registered health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Interval between probe executions.
    pub interval: Duration,

    /// Consecutive failures before the subsystem is reported degraded.
    pub unhealthy_threshold: u32,

    /// Deadline for one probe execution.
    pub probe_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            unhealthy_threshold: 3,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Defaults for circuit breakers created on first use.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Defaults for the retry layer.
    pub retry: RetryConfig,

    /// Self-healing manager configuration.
    pub healing: HealingConfig,

    /// Interval for the periodic metrics-update event.
    pub metrics_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            healing: HealingConfig::default(),
            metrics_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_category_tiers() {
        assert_eq!(TimeoutCategory::Short.duration(), Duration::from_secs(5));
        assert_eq!(TimeoutCategory::Default.duration(), Duration::from_secs(30));
        assert_eq!(TimeoutCategory::Medium.duration(), Duration::from_secs(30));
        assert_eq!(TimeoutCategory::Long.duration(), Duration::from_secs(120));
        assert_eq!(
            TimeoutCategory::Extended.duration(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_timeout_inference_keywords() {
        assert_eq!(
            TimeoutCategory::infer("query the user database"),
            TimeoutCategory::Medium
        );
        assert_eq!(
            TimeoutCategory::infer("analyze quarterly report"),
            TimeoutCategory::Long
        );
        assert_eq!(
            TimeoutCategory::infer("deploy new revision"),
            TimeoutCategory::Extended
        );
        assert_eq!(
            TimeoutCategory::infer("greet the user"),
            TimeoutCategory::Default
        );
    }

    #[test]
    fn test_install_outranks_database() {
        // A description matching several keyword sets takes the
        // longest tier.
        assert_eq!(
            TimeoutCategory::infer("install database extensions"),
            TimeoutCategory::Extended
        );
    }
}
