//! # Circuit Breaker Implementation
//!
//! Fault isolation for a single downstream dependency. Three states:
//! Closed (normal operation), Open (failing fast), and Half-Open (one trial
//! call decides whether the dependency has recovered).
//!
//! State lives behind a `parking_lot` mutex that is never held across an
//! `.await`; observers are notified after the lock is released, in the order
//! they were added.

use crate::error::{Classify, ErrorKind};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single trial call is allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("CLOSED"),
            CircuitState::Open => f.write_str("OPEN"),
            CircuitState::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit refused the call; the operation was never invoked
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }

    /// The operation's own error, if it ran
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::OperationFailed(e) => Some(e),
            CircuitBreakerError::CircuitOpen { .. } => None,
        }
    }
}

impl<E: Classify> Classify for CircuitBreakerError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            CircuitBreakerError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CircuitBreakerError::OperationFailed(e) => e.kind(),
        }
    }
}

/// Receives every state transition of a breaker
pub trait CircuitStateObserver: Send + Sync {
    fn on_state_change(&self, circuit: &str, from: CircuitState, to: CircuitState);
}

impl<F> CircuitStateObserver for F
where
    F: Fn(&str, CircuitState, CircuitState) + Send + Sync,
{
    fn on_state_change(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        self(circuit, from, to)
    }
}

/// Handle for removing an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Transition = (CircuitState, CircuitState);

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            times_opened: 0,
        }
    }

    fn open(&mut self) -> Transition {
        let from = self.state;
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.trial_in_flight = false;
        self.times_opened += 1;
        (from, CircuitState::Open)
    }

    fn close(&mut self) -> Transition {
        let from = self.state;
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
        (from, CircuitState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Releases the half-open trial slot if the trial future is dropped before
/// it reports an outcome.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
            debug!(component = %self.breaker.name, "Half-open trial abandoned");
        }
    }
}

/// Circuit breaker guarding one dependency
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,

    observers: RwLock<Vec<(ObserverId, Arc<dyn CircuitStateObserver>)>>,

    next_observer_id: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("observer_count", &self.observers.read().len())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
            observers: RwLock::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register an observer; it sees every later transition
    pub fn add_observer(&self, observer: Arc<dyn CircuitStateObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Remove a previously added observer. Returns false if it was not present.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let transition = match &result {
            Ok(_) => {
                debug!(component = %self.name, duration_ms, "🟢 Operation succeeded");
                self.record_success(admission)
            }
            Err(_) => {
                warn!(component = %self.name, duration_ms, "🔴 Operation failed");
                self.record_failure(admission)
            }
        };
        guard.armed = false;
        drop(guard);

        if let Some((from, to)) = transition {
            self.notify(from, to);
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed, moving Open -> HalfOpen when the
    /// cooldown has elapsed.
    fn admit<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let mut transition = None;
        let admission = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Some(Admission::Normal),
                CircuitState::Open => {
                    let cooled_down = inner
                        .opened_at
                        .map(|opened| opened.elapsed() >= self.config.cooldown)
                        .unwrap_or(true);
                    if cooled_down {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Some(Admission::Trial)
                    } else {
                        inner.rejected_count += 1;
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        inner.rejected_count += 1;
                        None
                    } else {
                        inner.trial_in_flight = true;
                        Some(Admission::Trial)
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            self.notify(from, to);
        }

        admission.ok_or_else(|| {
            debug!(component = %self.name, "⛔ Call rejected by open circuit");
            CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            }
        })
    }

    fn record_success(&self, admission: Admission) -> Option<Transition> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.success_count += 1;

        match (inner.state, admission) {
            (CircuitState::HalfOpen, Admission::Trial) => Some(inner.close()),
            (CircuitState::Closed, _) => {
                inner.consecutive_failures = 0;
                None
            }
            _ => None,
        }
    }

    fn record_failure(&self, admission: Admission) -> Option<Transition> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.failure_count += 1;

        match (inner.state, admission) {
            (CircuitState::Closed, _) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    Some(inner.open())
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, Admission::Trial) => Some(inner.open()),
            _ => None,
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => error!(
                component = %self.name,
                from = %from,
                failure_threshold = self.config.failure_threshold,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "🔴 Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                "🟡 Circuit breaker half-open (testing recovery)"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                from = %from,
                "🟢 Circuit breaker closed (recovered)"
            ),
        }

        let observers: Vec<Arc<dyn CircuitStateObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_state_change(&self.name, from, to);
        }
    }

    /// Force the circuit closed and clear its counters (operator "reset circuit")
    pub fn reset(&self) {
        let (from, to) = self.inner.lock().close();
        warn!(component = %self.name, from = %from, "🚨 Circuit breaker reset by operator");
        if from != to {
            self.notify(from, to);
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            rejected_count: inner.rejected_count,
            consecutive_failures: inner.consecutive_failures,
            times_opened: inner.times_opened,
            current_state: inner.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    async fn fail(circuit: &CircuitBreaker) {
        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = breaker(3, 100);
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_while_closed() {
        let circuit = breaker(3, 100);
        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.metrics().consecutive_failures, 2);

        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(circuit.metrics().consecutive_failures, 0);

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast_until_cooldown() {
        let circuit = breaker(2, 1_000);
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result = circuit
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(circuit
            .call(|| async { Ok::<_, String>(()) })
            .await
            .unwrap_err()
            .is_circuit_open());
        assert_eq!(circuit.metrics().rejected_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let circuit = breaker(1, 50);
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_cooldown() {
        let circuit = breaker(1, 50);
        fail(&circuit).await;
        tokio::time::advance(Duration::from_millis(60)).await;

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.metrics().times_opened, 2);

        tokio::time::advance(Duration::from_millis(30)).await;
        assert!(circuit
            .call(|| async { Ok::<_, String>(()) })
            .await
            .unwrap_err()
            .is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let circuit = Arc::new(breaker(1, 50));
        fail(&circuit).await;
        tokio::time::advance(Duration::from_millis(60)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_circuit = Arc::clone(&circuit);
        let trial = tokio::spawn(async move {
            trial_circuit
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, String>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let concurrent = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(concurrent.unwrap_err().is_circuit_open());

        release_tx.send(()).unwrap();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_see_transitions_in_order() {
        let circuit = breaker(1, 10);
        let seen: Arc<Mutex<Vec<(&'static str, CircuitState, CircuitState)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        circuit.add_observer(Arc::new(move |_: &str, from: CircuitState, to: CircuitState| {
            first.lock().push(("first", from, to));
        }));
        let second = Arc::clone(&seen);
        let second_id = circuit.add_observer(Arc::new(move |_: &str, from: CircuitState, to: CircuitState| {
            second.lock().push(("second", from, to));
        }));

        fail(&circuit).await;
        assert_eq!(
            *seen.lock(),
            vec![
                ("first", CircuitState::Closed, CircuitState::Open),
                ("second", CircuitState::Closed, CircuitState::Open),
            ]
        );

        assert!(circuit.remove_observer(second_id));
        seen.lock().clear();
        tokio::time::advance(Duration::from_millis(20)).await;
        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(
            *seen.lock(),
            vec![
                ("first", CircuitState::Open, CircuitState::HalfOpen),
                ("first", CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_closes_and_notifies() {
        let circuit = breaker(1, 60_000);
        let transitions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&transitions);
        circuit.add_observer(Arc::new(move |_: &str, _: CircuitState, _: CircuitState| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.reset();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 0);
        assert_eq!(transitions.load(Ordering::SeqCst), 2);

        // Resetting a closed circuit is silent
        circuit.reset();
        assert_eq!(transitions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_circuit_open_is_classified() {
        let err: CircuitBreakerError<crate::error::ResilienceError> =
            CircuitBreakerError::CircuitOpen {
                component: "mailer".to_string(),
            };
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);

        let err = CircuitBreakerError::OperationFailed(crate::error::ResilienceError::timeout(
            "slow",
        ));
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
