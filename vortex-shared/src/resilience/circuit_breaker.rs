//! Generic circuit breaker, ported from the orchestration stack's
//! `CircuitBreakerBehavior` design: a pre-flight `should_allow()` gate,
//! success/failure recording, and half-open recovery via a success
//! threshold rather than single-success closing.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    pub state: CircuitState,
}

/// Unified interface so callers can work with `&dyn CircuitBreakerBehavior`
/// when uniform access across distinct breaker instances is needed.
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self, duration: Duration);
    fn record_failure(&self, duration: Duration);
    fn is_healthy(&self) -> bool;
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8State,
    consecutive_failures: AtomicU64,
    consecutive_successes: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
}

/// Thin wrapper so `CircuitState` can live behind an `AtomicU8`.
#[derive(Debug, Default)]
struct AtomicU8State(AtomicU32);

impl AtomicU8State {
    fn load(&self) -> CircuitState {
        CircuitState::from(self.0.load(Ordering::SeqCst) as u8)
    }

    fn store(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.0.store(value, Ordering::SeqCst);
    }
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: AtomicU8State::default(),
            consecutive_failures: AtomicU64::new(0),
            consecutive_successes: AtomicU64::new(0),
            opened_at: Mutex::new(None),
        }
    }

    fn transition_to_half_open_if_elapsed(&self) {
        if self.state.load() != CircuitState::Open {
            return;
        }
        let elapsed = {
            let guard = self.opened_at.lock().expect("circuit breaker mutex poisoned");
            guard.map(|t| t.elapsed() >= self.config.timeout).unwrap_or(true)
        };
        if elapsed {
            self.state.store(CircuitState::HalfOpen);
            self.consecutive_successes.store(0, Ordering::SeqCst);
        }
    }

    pub fn record_success_manual(&self, _duration: Duration) {
        match self.state.load() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold as u64 {
                    self.state.store(CircuitState::Closed);
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure_manual(&self, _duration: Duration) {
        match self.state.load() {
            CircuitState::HalfOpen => {
                self.state.store(CircuitState::Open);
                *self.opened_at.lock().expect("circuit breaker mutex poisoned") = Some(Instant::now());
                self.consecutive_successes.store(0, Ordering::SeqCst);
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold as u64 {
                    self.state.store(CircuitState::Open);
                    *self.opened_at.lock().expect("circuit breaker mutex poisoned") = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.transition_to_half_open_if_elapsed();
        self.state.load()
    }

    fn should_allow(&self) -> bool {
        self.transition_to_half_open_if_elapsed();
        !matches!(self.state.load(), CircuitState::Open)
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration);
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration);
    }

    fn is_healthy(&self) -> bool {
        matches!(self.state(), CircuitState::Closed)
    }

    fn force_open(&self) {
        self.state.store(CircuitState::Open);
        *self.opened_at.lock().expect("circuit breaker mutex poisoned") = Some(Instant::now());
    }

    fn force_closed(&self) {
        self.state.store(CircuitState::Closed);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.consecutive_successes.store(0, Ordering::SeqCst);
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            consecutive_successes: self.consecutive_successes.load(Ordering::SeqCst),
            state: self.state.load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..Default::default()
            },
        );
        cb.record_failure(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn half_open_recovery_requires_success_threshold() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::ZERO,
                success_threshold: 2,
            },
        );
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
        // zero timeout: next state() call transitions to half-open
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::ZERO,
                success_threshold: 2,
            },
        );
        cb.record_failure(Duration::ZERO);
        assert!(cb.should_allow());
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn force_operations() {
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.force_closed();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn object_safety() {
        fn assert_object_safe(_: &dyn CircuitBreakerBehavior) {}
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        assert_object_safe(&cb);
    }
}
