//! Self-healing: automated remediation keyed by failure kind.
//!
//! Strategies run out-of-band after a failure has already been
//! reported to the caller; they only improve the odds for subsequent
//! calls. Each strategy has a cooldown window and an attempt budget
//! that refills on success, and the manager caps concurrent healing
//! globally.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use aegis_types::{FailureKind, HealingAttemptId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{HealingConfig, HealingStrategyConfig};
use crate::context::OperationContext;
use crate::error::{ResilienceError, Result};
use crate::events::{EventBus, ResilienceEvent};

/// A remediation action for one failure kind.
#[async_trait]
pub trait HealingAction: Send + Sync {
    async fn heal(&self, ctx: &OperationContext) -> Result<()>;
}

struct FnHealing<F>(F);

#[async_trait]
impl<F, Fut> HealingAction for FnHealing<F>
where
    F: Fn(OperationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn heal(&self, ctx: &OperationContext) -> Result<()> {
        (self.0)(ctx.clone()).await
    }
}

/// Wrap an async closure as a [`HealingAction`].
pub fn healing_fn<F, Fut>(f: F) -> Arc<dyn HealingAction>
where
    F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHealing(f))
}

/// Why a healing attempt was refused without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingRefusal {
    /// No strategy registered for the failure kind.
    NoStrategy,

    /// The strategy is still inside its cooldown window.
    Cooldown,

    /// The global concurrent-healing cap is reached.
    Saturated,

    /// The strategy's attempt budget is spent.
    AttemptsExhausted,
}

impl std::fmt::Display for HealingRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealingRefusal::NoStrategy => write!(f, "no strategy registered"),
            HealingRefusal::Cooldown => write!(f, "cooldown"),
            HealingRefusal::Saturated => write!(f, "max concurrent healing reached"),
            HealingRefusal::AttemptsExhausted => write!(f, "attempt budget exhausted"),
        }
    }
}

/// Outcome of one healing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealingReport {
    /// The action ran and succeeded.
    Healed { duration: Duration },

    /// The action ran and failed (or timed out).
    Failed { error: String },

    /// The action was not run.
    Refused(HealingRefusal),
}

impl HealingReport {
    pub fn is_success(&self) -> bool {
        matches!(self, HealingReport::Healed { .. })
    }
}

/// One entry in the healing audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingRecord {
    pub id: HealingAttemptId,
    pub kind: FailureKind,
    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

struct StrategyEntry {
    config: HealingStrategyConfig,
    action: Arc<dyn HealingAction>,
    attempt_count: u32,
    last_attempt: Option<Instant>,
}

/// Aggregate self-healing metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingMetrics {
    pub registered_strategies: usize,
    pub active_healing: usize,
    pub total_success: u64,
    pub total_failure: u64,
    pub history_len: usize,
}

/// Maps failure kinds to healing strategies with cooldown and
/// attempt caps.
pub struct SelfHealingManager {
    strategies: DashMap<FailureKind, StrategyEntry>,
    history: RwLock<VecDeque<HealingRecord>>,
    active_healing: AtomicUsize,
    total_success: AtomicU64,
    total_failure: AtomicU64,
    config: HealingConfig,
    events: EventBus,
}

impl SelfHealingManager {
    pub fn new(config: HealingConfig, events: EventBus) -> Self {
        Self {
            strategies: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            active_healing: AtomicUsize::new(0),
            total_success: AtomicU64::new(0),
            total_failure: AtomicU64::new(0),
            config,
            events,
        }
    }

    /// Register (or replace) the strategy for a failure kind.
    pub fn register_strategy(
        &self,
        kind: FailureKind,
        action: Arc<dyn HealingAction>,
        config: HealingStrategyConfig,
    ) {
        self.strategies.insert(
            kind,
            StrategyEntry {
                config,
                action,
                attempt_count: 0,
                last_attempt: None,
            },
        );
    }

    /// Attempt to heal a classified failure.
    ///
    /// Refuses (without running the action) when no strategy is
    /// registered, the cooldown window is still open, the global
    /// concurrency cap is reached, or the attempt budget is spent.
    /// Success refills the attempt budget.
    #[instrument(skip(self, ctx), fields(kind = %kind))]
    pub async fn attempt_healing(&self, kind: FailureKind, ctx: &OperationContext) -> HealingReport {
        if self.active_healing.load(Ordering::SeqCst) >= self.config.max_concurrent_healing {
            warn!(kind = %kind, "Healing refused: concurrency cap reached");
            return self.refuse(kind, HealingRefusal::Saturated);
        }

        let (action, strategy_config) = {
            let mut entry = match self.strategies.get_mut(&kind) {
                Some(entry) => entry,
                None => return self.refuse(kind, HealingRefusal::NoStrategy),
            };

            if let Some(last) = entry.last_attempt {
                if last.elapsed() < entry.config.cooldown_period {
                    return self.refuse(kind, HealingRefusal::Cooldown);
                }
            }
            if entry.attempt_count >= entry.config.max_attempts {
                return self.refuse(kind, HealingRefusal::AttemptsExhausted);
            }

            entry.last_attempt = Some(Instant::now());
            (entry.action.clone(), entry.config.clone())
        };

        self.active_healing.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(strategy_config.timeout, action.heal(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ResilienceError::HealingTimeout {
                kind,
                timeout: strategy_config.timeout,
            }),
        };

        self.active_healing.fetch_sub(1, Ordering::SeqCst);
        let duration = started.elapsed();

        match outcome {
            Ok(()) => {
                if let Some(mut entry) = self.strategies.get_mut(&kind) {
                    // A success refills the budget for future episodes.
                    entry.attempt_count = 0;
                }
                self.total_success.fetch_add(1, Ordering::SeqCst);
                self.record(kind, true, None, started_at, duration);
                info!(kind = %kind, duration_ms = duration.as_millis() as u64, "Healing succeeded");
                self.events.emit(ResilienceEvent::HealingSucceeded { kind, duration });
                HealingReport::Healed { duration }
            }
            Err(err) => {
                if let Some(mut entry) = self.strategies.get_mut(&kind) {
                    let cap = entry.config.max_attempts;
                    entry.attempt_count = (entry.attempt_count + 1).min(cap);
                }
                self.total_failure.fetch_add(1, Ordering::SeqCst);
                let message = err.to_string();
                self.record(kind, false, Some(message.clone()), started_at, duration);
                warn!(kind = %kind, error = %message, "Healing failed");
                self.events.emit(ResilienceEvent::HealingFailed {
                    kind,
                    reason: message.clone(),
                });
                HealingReport::Failed { error: message }
            }
        }
    }

    /// Recent healing attempts, oldest first.
    pub fn history(&self) -> Vec<HealingRecord> {
        self.history.read().unwrap().iter().cloned().collect()
    }

    /// Aggregate metrics.
    pub fn metrics(&self) -> HealingMetrics {
        HealingMetrics {
            registered_strategies: self.strategies.len(),
            active_healing: self.active_healing.load(Ordering::SeqCst),
            total_success: self.total_success.load(Ordering::SeqCst),
            total_failure: self.total_failure.load(Ordering::SeqCst),
            history_len: self.history.read().unwrap().len(),
        }
    }

    fn refuse(&self, kind: FailureKind, refusal: HealingRefusal) -> HealingReport {
        self.events.emit(ResilienceEvent::HealingFailed {
            kind,
            reason: refusal.to_string(),
        });
        HealingReport::Refused(refusal)
    }

    fn record(
        &self,
        kind: FailureKind,
        success: bool,
        error: Option<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) {
        let mut history = self.history.write().unwrap();
        history.push_back(HealingRecord {
            id: HealingAttemptId::generate(),
            kind,
            success,
            error,
            started_at,
            duration_ms: duration.as_millis() as u64,
        });
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn manager() -> SelfHealingManager {
        SelfHealingManager::new(HealingConfig::default(), EventBus::default())
    }

    fn strategy_config(cooldown_ms: u64, max_attempts: u32) -> HealingStrategyConfig {
        HealingStrategyConfig {
            priority: 1,
            cooldown_period: Duration::from_millis(cooldown_ms),
            max_attempts,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_no_strategy_refused() {
        let manager = manager();
        let report = manager
            .attempt_healing(FailureKind::Memory, &OperationContext::new())
            .await;
        assert_eq!(report, HealingReport::Refused(HealingRefusal::NoStrategy));
    }

    #[tokio::test]
    async fn test_successful_healing_recorded() {
        let manager = manager();
        manager.register_strategy(
            FailureKind::Connection,
            healing_fn(|_ctx| async { Ok(()) }),
            strategy_config(0, 3),
        );

        let report = manager
            .attempt_healing(FailureKind::Connection, &OperationContext::new())
            .await;
        assert!(report.is_success());

        let metrics = manager.metrics();
        assert_eq!(metrics.total_success, 1);
        assert_eq!(metrics.history_len, 1);
        assert!(manager.history()[0].success);
    }

    #[tokio::test]
    async fn test_cooldown_refuses_second_attempt() {
        let manager = manager();
        manager.register_strategy(
            FailureKind::Timeout,
            healing_fn(|_ctx| async { Ok(()) }),
            strategy_config(60_000, 3),
        );

        let first = manager
            .attempt_healing(FailureKind::Timeout, &OperationContext::new())
            .await;
        assert!(first.is_success());

        let second = manager
            .attempt_healing(FailureKind::Timeout, &OperationContext::new())
            .await;
        assert_eq!(second, HealingReport::Refused(HealingRefusal::Cooldown));
        // The healing function was not invoked a second time.
        assert_eq!(manager.metrics().history_len, 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_exhausts_and_refills_on_success() {
        let manager = manager();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_fn = calls.clone();
        manager.register_strategy(
            FailureKind::Memory,
            healing_fn(move |_ctx| {
                let n = calls_in_fn.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ResilienceError::Internal("still broken".into()))
                    } else {
                        Ok(())
                    }
                }
            }),
            strategy_config(0, 2),
        );
        let ctx = OperationContext::new();

        // Two failures spend the budget.
        assert!(matches!(
            manager.attempt_healing(FailureKind::Memory, &ctx).await,
            HealingReport::Failed { .. }
        ));
        assert!(matches!(
            manager.attempt_healing(FailureKind::Memory, &ctx).await,
            HealingReport::Failed { .. }
        ));
        assert_eq!(
            manager.attempt_healing(FailureKind::Memory, &ctx).await,
            HealingReport::Refused(HealingRefusal::AttemptsExhausted)
        );

        // Refill the budget directly and succeed; the count resets.
        manager
            .strategies
            .get_mut(&FailureKind::Memory)
            .unwrap()
            .attempt_count = 0;
        assert!(manager
            .attempt_healing(FailureKind::Memory, &ctx)
            .await
            .is_success());
        assert_eq!(
            manager
                .strategies
                .get(&FailureKind::Memory)
                .unwrap()
                .attempt_count,
            0
        );
    }

    #[tokio::test]
    async fn test_healing_timeout_counts_as_failure() {
        let manager = manager();
        manager.register_strategy(
            FailureKind::RateLimit,
            healing_fn(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
            HealingStrategyConfig {
                timeout: Duration::from_millis(20),
                cooldown_period: Duration::ZERO,
                ..HealingStrategyConfig::default()
            },
        );

        let report = manager
            .attempt_healing(FailureKind::RateLimit, &OperationContext::new())
            .await;
        match report {
            HealingReport::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("unexpected report: {other:?}"),
        }
        assert_eq!(manager.metrics().total_failure, 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let manager = SelfHealingManager::new(
            HealingConfig {
                max_history: 3,
                ..HealingConfig::default()
            },
            EventBus::default(),
        );
        manager.register_strategy(
            FailureKind::Connection,
            healing_fn(|_ctx| async { Ok(()) }),
            strategy_config(0, 100),
        );

        for _ in 0..6 {
            manager
                .attempt_healing(FailureKind::Connection, &OperationContext::new())
                .await;
        }
        assert_eq!(manager.history().len(), 3);
    }
}
