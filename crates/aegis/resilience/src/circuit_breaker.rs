//! Circuit breaker pattern for resilience.
//!
//! Prevents cascading failures by tracking failure rates per operation
//! name and temporarily blocking calls to a known-bad dependency.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::events::{EventBus, ResilienceEvent};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally.
    Closed,

    /// Circuit is open, calls are blocked.
    Open,

    /// Circuit is testing whether the dependency has recovered.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A state transition, reported to callers so they can emit events.
pub type Transition = Option<(CircuitState, CircuitState)>;

/// Circuit breaker for a single operation name.
///
/// Tracks failures and successes, transitioning between states:
/// - Closed: normal operation, calls allowed
/// - Open: too many failures, calls blocked until the reset timeout
/// - Half-Open: limited trial calls decide whether to close or reopen
pub struct CircuitBreaker {
    /// Operation name this breaker guards.
    name: String,

    /// Current state.
    state: RwLock<CircuitState>,

    /// Configuration.
    config: CircuitBreakerConfig,

    /// Consecutive failures in closed state.
    failure_count: AtomicU32,

    /// Consecutive successes in half-open state.
    success_count: AtomicU32,

    /// Requests allowed through in half-open state.
    half_open_requests: AtomicU32,

    /// Timestamp when the circuit opened (milliseconds since epoch).
    opened_at: AtomicU64,

    /// Time of last state change.
    last_transition: RwLock<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for an operation name.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(CircuitState::Closed),
            config,
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_requests: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            last_transition: RwLock::new(Utc::now()),
        }
    }

    /// Get the operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state, applying the open-to-half-open timeout.
    pub fn state(&self) -> CircuitState {
        self.check_timeout();
        *self.state.read().unwrap()
    }

    /// Check if a call should be allowed through.
    ///
    /// Half-open allows at most `half_open_max_requests` trial calls.
    /// Returns the state transition if the timeout check moved the
    /// circuit to half-open.
    pub fn allow_request(&self) -> (bool, Transition) {
        let transition = self.check_timeout();

        let state = self.state.read().unwrap();
        let allowed = match *state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let current = self.half_open_requests.fetch_add(1, Ordering::SeqCst);
                current < self.config.half_open_max_requests
            }
        };
        (allowed, transition)
    }

    /// Record a successful operation.
    pub fn record_success(&self) -> Transition {
        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
                None
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;

                if successes >= self.config.success_threshold {
                    info!(
                        operation = %self.name,
                        successes = successes,
                        "Circuit breaker closing after successful recovery"
                    );
                    Some(self.transition_to(&mut state, CircuitState::Closed))
                } else {
                    None
                }
            }
            CircuitState::Open => {
                // A late completion from before the circuit opened.
                debug!(operation = %self.name, "Success recorded while circuit open");
                None
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) -> Transition {
        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;

                if failures >= self.config.failure_threshold {
                    warn!(
                        operation = %self.name,
                        failures = failures,
                        "Circuit breaker opening due to failures"
                    );
                    Some(self.transition_to(&mut state, CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open goes straight back to open.
                warn!(
                    operation = %self.name,
                    "Circuit breaker re-opening after half-open failure"
                );
                Some(self.transition_to(&mut state, CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    /// Force the circuit to a specific state.
    pub fn force_state(&self, new_state: CircuitState) -> Transition {
        let mut state = self.state.write().unwrap();
        info!(
            operation = %self.name,
            old_state = %*state,
            new_state = %new_state,
            "Circuit breaker state forced"
        );
        Some(self.transition_to(&mut state, new_state))
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) -> Transition {
        self.force_state(CircuitState::Closed)
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: self.name.clone(),
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::SeqCst),
            success_count: self.success_count.load(Ordering::SeqCst),
            last_transition: *self.last_transition.read().unwrap(),
        }
    }

    /// Transition from open to half-open once the reset timeout has
    /// elapsed. Checked lazily on every state read.
    fn check_timeout(&self) -> Transition {
        if *self.state.read().unwrap() != CircuitState::Open {
            return None;
        }

        let opened_at = self.opened_at.load(Ordering::SeqCst);
        if opened_at == 0 {
            return None;
        }

        let elapsed_ms = (Utc::now().timestamp_millis() as u64).saturating_sub(opened_at);
        if u128::from(elapsed_ms) >= self.config.reset_timeout.as_millis() {
            let mut state = self.state.write().unwrap();
            if *state == CircuitState::Open {
                info!(
                    operation = %self.name,
                    "Circuit breaker transitioning to half-open after timeout"
                );
                return Some(self.transition_to(&mut state, CircuitState::HalfOpen));
            }
        }
        None
    }

    /// Transition to a new state, resetting counters as needed.
    fn transition_to(
        &self,
        state: &mut CircuitState,
        new_state: CircuitState,
    ) -> (CircuitState, CircuitState) {
        let old_state = *state;
        *state = new_state;
        *self.last_transition.write().unwrap() = Utc::now();

        match new_state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                self.opened_at.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {
                self.success_count.store(0, Ordering::SeqCst);
                self.half_open_requests.store(0, Ordering::SeqCst);
                self.opened_at
                    .store(Utc::now().timestamp_millis() as u64, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                self.success_count.store(0, Ordering::SeqCst);
                self.half_open_requests.store(0, Ordering::SeqCst);
            }
        }

        (old_state, new_state)
    }
}

/// Statistics for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Operation name.
    pub name: String,

    /// Current state.
    pub state: CircuitState,

    /// Number of recorded failures.
    pub failure_count: u32,

    /// Number of recorded successes (in half-open).
    pub success_count: u32,

    /// Time of last state transition.
    pub last_transition: DateTime<Utc>,
}

/// Registry of circuit breakers keyed by operation name.
///
/// Breakers are created lazily on first use and live for the process
/// lifetime. Every state transition is published on the event bus.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    events: EventBus,
}

impl CircuitBreakerRegistry {
    /// Create a registry with defaults applied to new breakers.
    pub fn new(default_config: CircuitBreakerConfig, events: EventBus) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            events,
        }
    }

    /// Get or create the breaker for an operation name.
    ///
    /// `config` applies only when the breaker is first created; an
    /// existing breaker keeps its original configuration and a
    /// supplied override is logged and dropped.
    pub fn breaker(&self, name: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            if config.is_some() {
                debug!(
                    operation = name,
                    "Breaker already exists, supplied config ignored"
                );
            }
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    config.unwrap_or_else(|| self.default_config.clone()),
                ))
            })
            .clone()
    }

    /// Look up an existing breaker without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Publish a transition on the event bus.
    pub fn publish_transition(&self, name: &str, transition: Transition) {
        if let Some((from, to)) = transition {
            self.events.emit(ResilienceEvent::CircuitBreakerStateChange {
                name: name.to_string(),
                from,
                to,
            });
        }
    }

    /// Snapshot of all breaker stats.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| entry.value().stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_millis(100),
            half_open_max_requests: 2,
        }
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request().0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let transition = breaker.record_failure();
        assert_eq!(
            transition,
            Some((CircuitState::Closed, CircuitState::Open))
        );
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request().0);
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success(); // resets the failure count

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_half_open_to_closed() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());

        breaker.force_state(CircuitState::HalfOpen);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let transition = breaker.record_success();
        assert_eq!(
            transition,
            Some((CircuitState::HalfOpen, CircuitState::Closed))
        );
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());

        breaker.force_state(CircuitState::HalfOpen);

        let transition = breaker.record_failure();
        assert_eq!(
            transition,
            Some((CircuitState::HalfOpen, CircuitState::Open))
        );
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_breaker_open_to_half_open_after_timeout() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_limits_trial_requests() {
        let breaker = CircuitBreaker::new("fetch-user", test_config());
        breaker.force_state(CircuitState::HalfOpen);

        assert!(breaker.allow_request().0);
        assert!(breaker.allow_request().0);
        // Third trial exceeds half_open_max_requests = 2.
        assert!(!breaker.allow_request().0);
    }

    #[test]
    fn test_low_threshold_opens_on_second_failure() {
        let breaker = CircuitBreaker::new(
            "api-call",
            CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 3,
                reset_timeout: Duration::from_secs(1),
                half_open_max_requests: 3,
            },
        );

        breaker.record_failure();
        assert!(breaker.allow_request().0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // Rejected without waiting out the reset timeout.
        assert!(!breaker.allow_request().0);
    }

    #[tokio::test]
    async fn test_registry_emits_state_change() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let registry = CircuitBreakerRegistry::new(test_config(), events);

        let breaker = registry.breaker("payments", None);
        breaker.record_failure();
        breaker.record_failure();
        let transition = breaker.record_failure();
        registry.publish_transition("payments", transition);

        match rx.recv().await.unwrap() {
            ResilienceEvent::CircuitBreakerStateChange { name, from, to } => {
                assert_eq!(name, "payments");
                assert_eq!(from, CircuitState::Closed);
                assert_eq!(to, CircuitState::Open);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_registry_reuses_breaker_instances() {
        let registry = CircuitBreakerRegistry::new(test_config(), EventBus::default());
        let a = registry.breaker("same", None);
        let b = registry.breaker("same", None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registry_keeps_first_config() {
        let registry = CircuitBreakerRegistry::new(test_config(), EventBus::default());
        let first = registry.breaker(
            "tight",
            Some(CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 2,
                reset_timeout: Duration::from_secs(1),
                half_open_max_requests: 2,
            }),
        );

        // A later, looser config is dropped in favor of the original.
        let again = registry.breaker(
            "tight",
            Some(CircuitBreakerConfig {
                failure_threshold: 99,
                success_threshold: 2,
                reset_timeout: Duration::from_secs(1),
                half_open_max_requests: 2,
            }),
        );
        assert!(Arc::ptr_eq(&first, &again));

        again.record_failure();
        let transition = again.record_failure();
        assert_eq!(transition, Some((CircuitState::Closed, CircuitState::Open)));
    }
}
