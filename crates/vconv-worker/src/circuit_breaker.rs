//! Circuit breaker for external dependencies.
//!
//! One breaker exists per dependency name and is shared by every job calling
//! that dependency. All state changes happen under the breaker's lock, so the
//! half-open probe cap holds even when many jobs probe at once.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::env_parse;
use crate::metrics;

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Minimum time the circuit stays open before probing
    pub reset_timeout: Duration,
    /// Probe calls allowed while half-open; as many successes close it
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Default thresholds from `CB_FAILURE_THRESHOLD`, `CB_RESET_TIMEOUT_SECS`
    /// and `CB_HALF_OPEN_MAX_CALLS`.
    pub fn from_env() -> Self {
        Self::default().with_env_prefix("CB")
    }

    /// Thresholds for `name`, overridden by `CB_<NAME>_*` variables.
    pub fn for_dependency(&self, name: &str) -> Self {
        let prefix = format!("CB_{}", name.to_uppercase().replace(['-', '.', ' '], "_"));
        self.clone().with_env_prefix(&prefix)
    }

    fn with_env_prefix(self, prefix: &str) -> Self {
        Self {
            failure_threshold: env_parse(
                &format!("{}_FAILURE_THRESHOLD", prefix),
                self.failure_threshold,
            )
            .max(1),
            reset_timeout: Duration::from_secs(env_parse(
                &format!("{}_RESET_TIMEOUT_SECS", prefix),
                self.reset_timeout.as_secs(),
            )),
            half_open_max_calls: env_parse(
                &format!("{}_HALF_OPEN_MAX_CALLS", prefix),
                self.half_open_max_calls,
            )
            .max(1),
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned instead of running the operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Circuit breaker '{name}' is open, retry after {:.1}s", .retry_after.as_secs_f64())]
pub struct CircuitBreakerError {
    /// Dependency name
    pub name: String,
    /// Remaining time until the next half-open probe
    pub retry_after: Duration,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call; the operation was not invoked.
    #[error(transparent)]
    Open(CircuitBreakerError),
    /// The operation ran and returned its own error.
    #[error("{0}")]
    Inner(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_secs: f64,
    /// Seconds until the next half-open probe; zero unless open
    pub seconds_until_half_open: f64,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
    success_count: u32,
}

impl Inner {
    fn closed() -> Self {
        Self {
            phase: Phase::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_calls: 0,
            success_count: 0,
        }
    }
}

/// Failure-tracking breaker for one dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker. Every error counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(operation, |_| false).await
    }

    /// Run `operation` through the breaker.
    ///
    /// Errors for which `is_excluded` returns true are passed through without
    /// being recorded as failures.
    pub async fn execute_with<F, Fut, T, E, X>(
        &self,
        operation: F,
        is_excluded: X,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        X: FnOnce(&E) -> bool,
    {
        self.admit().map_err(CallError::Open)?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if is_excluded(&e) {
                    self.on_excluded();
                } else {
                    self.on_failure();
                }
                Err(CallError::Inner(e))
            }
        }
    }

    /// Return to CLOSED with all counters zeroed.
    pub fn reset(&self) {
        *self.lock() = Inner::closed();
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Current state. An open breaker whose timeout has elapsed still reports
    /// OPEN until the next call moves it to HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        match self.lock().phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        let (state, seconds_until_half_open) = match inner.phase {
            Phase::Closed => (CircuitState::Closed, 0.0),
            Phase::Open { until } => (
                CircuitState::Open,
                until.saturating_duration_since(Instant::now()).as_secs_f64(),
            ),
            Phase::HalfOpen => (CircuitState::HalfOpen, 0.0),
        };

        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state,
            failure_count: inner.failure_count,
            half_open_calls: inner.half_open_calls,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_secs: self.config.reset_timeout.as_secs_f64(),
            seconds_until_half_open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pre-call admission check.
    fn admit(&self) -> Result<(), CircuitBreakerError> {
        let mut inner = self.lock();
        let now = Instant::now();

        if let Phase::Open { until } = inner.phase {
            if now < until {
                metrics::record_breaker_rejection(&self.name);
                return Err(self.open_error(until - now));
            }
            info!(breaker = %self.name, "Circuit breaker half-open, probing dependency");
            inner.phase = Phase::HalfOpen;
            inner.half_open_calls = 0;
            inner.success_count = 0;
        }

        if let Phase::HalfOpen = inner.phase {
            if inner.half_open_calls >= self.config.half_open_max_calls {
                let wait = self.trip(&mut inner, now);
                metrics::record_breaker_rejection(&self.name);
                return Err(self.open_error(wait));
            }
            inner.half_open_calls += 1;
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.phase {
            Phase::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_max_calls {
                    *inner = Inner {
                        last_failure: inner.last_failure,
                        ..Inner::closed()
                    };
                    info!(breaker = %self.name, "Circuit breaker closed, dependency recovered");
                }
            }
            Phase::Closed => inner.failure_count = 0,
            Phase::Open { .. } => {}
        }
    }

    /// An excluded error is neither a success nor a failure; in HALF_OPEN the
    /// admitted slot goes back to the probe budget.
    fn on_excluded(&self) {
        let mut inner = self.lock();
        if let Phase::HalfOpen = inner.phase {
            inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.last_failure = Some(now);

        match inner.phase {
            Phase::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                }
            }
            Phase::HalfOpen => {
                self.trip(&mut inner, now);
            }
            Phase::Open { .. } => {}
        }
    }

    /// Open the circuit and return the wait before the next probe.
    fn trip(&self, inner: &mut Inner, now: Instant) -> Duration {
        let jitter_ceiling = self.config.reset_timeout.mul_f64(0.1);
        let wait = self.config.reset_timeout + jitter_ceiling.mul_f64(rand::random::<f64>());

        inner.phase = Phase::Open { until: now + wait };
        inner.half_open_calls = 0;
        inner.success_count = 0;

        warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            wait_secs = wait.as_secs_f64(),
            "Circuit breaker opened"
        );
        metrics::record_breaker_trip(&self.name);
        wait
    }

    fn open_error(&self, retry_after: Duration) -> CircuitBreakerError {
        CircuitBreakerError {
            name: self.name.clone(),
            retry_after,
        }
    }
}

/// Breakers keyed by dependency name, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    resolve_env: bool,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            resolve_env: false,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry whose breakers read `CB_<NAME>_*` overrides on creation.
    pub fn from_env(default_config: CircuitBreakerConfig) -> Self {
        Self {
            resolve_env: true,
            ..Self::new(default_config)
        }
    }

    /// Fixed thresholds for `name`.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name) {
            return breaker;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config_for(name))))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    /// Snapshots of every known breaker, sorted by name.
    pub fn snapshot_all(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Reset one breaker. Returns false if `name` is unknown.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker; returns how many were reset.
    pub fn reset_all(&self) -> usize {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        for breaker in &breakers {
            breaker.reset();
        }
        breakers.len()
    }

    fn config_for(&self, name: &str) -> CircuitBreakerConfig {
        if let Some(config) = self.overrides.get(name) {
            return config.clone();
        }
        if self.resolve_env {
            self.default_config.for_dependency(name)
        } else {
            self.default_config.clone()
        }
    }
}
