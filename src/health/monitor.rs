//! # Service Health Monitor
//!
//! Registry of monitored dependencies. Each registered service gets a
//! recurring check task plus, when it carries a circuit breaker, a passive
//! observer that re-derives health on every breaker transition.
//!
//! Per-service checks are serialized by an async mutex, so results for one
//! service are applied in order. Different services check independently.
//! Registry state lives behind a `parking_lot::RwLock` that is never held
//! across an `.await`; alert handlers and breaker calls run with it released.

use crate::health::alert::{AlertHandler, HealthAlert, LoggingAlertHandler};
use crate::health::check::{HealthCheck, HealthCheckError, ServiceDescriptor};
use crate::health::types::{HealthStatus, ServiceHealth, StatusChange, SystemHealth};
use crate::resilience::{CircuitBreaker, CircuitState, CircuitStateObserver, ObserverId};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Effective check configuration of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures before the service is Unhealthy
    pub unhealthy_threshold: u32,
    /// Consecutive failures before the service is Degraded
    pub degraded_threshold: u32,
    /// Consecutive successes before the service is Healthy again
    pub healthy_threshold: u32,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            unhealthy_threshold: 3,
            degraded_threshold: 1,
            healthy_threshold: 2,
        }
    }
}

impl CheckSettings {
    fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("interval must be greater than 0".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        for (name, value) in [
            ("unhealthy_threshold", self.unhealthy_threshold),
            ("degraded_threshold", self.degraded_threshold),
            ("healthy_threshold", self.healthy_threshold),
        ] {
            if value < 1 {
                return Err(format!("{name} must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Per-service overrides of the monitor defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCheckOptions {
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub unhealthy_threshold: Option<u32>,
    pub degraded_threshold: Option<u32>,
    pub healthy_threshold: Option<u32>,
}

impl ServiceCheckOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_thresholds(mut self, unhealthy: u32, degraded: u32, healthy: u32) -> Self {
        self.unhealthy_threshold = Some(unhealthy);
        self.degraded_threshold = Some(degraded);
        self.healthy_threshold = Some(healthy);
        self
    }

    /// Overlay these options on `defaults`
    pub fn resolve(&self, defaults: &CheckSettings) -> CheckSettings {
        CheckSettings {
            interval: self.interval.unwrap_or(defaults.interval),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            unhealthy_threshold: self
                .unhealthy_threshold
                .unwrap_or(defaults.unhealthy_threshold),
            degraded_threshold: self
                .degraded_threshold
                .unwrap_or(defaults.degraded_threshold),
            healthy_threshold: self.healthy_threshold.unwrap_or(defaults.healthy_threshold),
        }
    }
}

/// Monitor-wide configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub defaults: CheckSettings,
    /// Minimum gap between two alerts for the same service
    pub min_alert_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            defaults: CheckSettings::default(),
            min_alert_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service {0} has no circuit breaker attached")]
    NoCircuitBreaker(String),

    #[error("Invalid check options for {service_id}: {reason}")]
    InvalidOptions { service_id: String, reason: String },
}

enum CheckOutcome {
    Passed,
    Failed(HealthCheckError),
    Unchecked,
}

struct ServiceEntry {
    /// Distinguishes this registration from a later one under the same id
    registration: u64,
    descriptor: ServiceDescriptor,
    settings: CheckSettings,
    health: ServiceHealth,
    last_alert_at: Option<Instant>,
    check_lock: Arc<tokio::sync::Mutex<()>>,
    task: Option<JoinHandle<()>>,
    observer_id: Option<ObserverId>,
}

impl ServiceEntry {
    /// Detach the background task and breaker observer for cleanup
    fn take_attachments(&mut self) -> Attachments {
        Attachments {
            task: self.task.take(),
            observer: self
                .observer_id
                .take()
                .and_then(|id| self.descriptor.circuit_breaker.clone().map(|cb| (cb, id))),
        }
    }
}

struct Attachments {
    task: Option<JoinHandle<()>>,
    observer: Option<(Arc<CircuitBreaker>, ObserverId)>,
}

impl Attachments {
    fn release(self) {
        if let Some(task) = self.task {
            task.abort();
        }
        if let Some((breaker, id)) = self.observer {
            breaker.remove_observer(id);
        }
    }
}

struct MonitorInner {
    config: MonitorConfig,
    services: RwLock<HashMap<String, ServiceEntry>>,
    alert_handler: Arc<dyn AlertHandler>,
    /// Build error when the client could not be constructed
    http_client: Result<reqwest::Client, String>,
    next_registration: AtomicU64,
}

impl MonitorInner {
    /// One check of `service_id`. `None` when the registration is gone.
    async fn run_check(&self, service_id: &str, registration: u64) -> Option<ServiceHealth> {
        let (check_lock, check, breaker, timeout) = {
            let services = self.services.read();
            let entry = services
                .get(service_id)
                .filter(|entry| entry.registration == registration)?;
            (
                Arc::clone(&entry.check_lock),
                entry.descriptor.check.clone(),
                entry.descriptor.circuit_breaker.clone(),
                entry.settings.timeout,
            )
        };

        let _serialized = check_lock.lock().await;
        let started = Instant::now();

        let outcome = match (&check, &breaker) {
            (Some(check), _) => match self.probe(check, timeout).await {
                Ok(()) => CheckOutcome::Passed,
                Err(error) => CheckOutcome::Failed(error),
            },
            (None, Some(breaker)) => match breaker.state() {
                CircuitState::Closed => CheckOutcome::Passed,
                state => CheckOutcome::Failed(HealthCheckError::CircuitNotClosed(state)),
            },
            (None, None) => CheckOutcome::Unchecked,
        };
        let elapsed = started.elapsed();
        let circuit_state = breaker.as_ref().map(|cb| cb.state());

        let (change, alert, snapshot) = {
            let mut services = self.services.write();
            let entry = services
                .get_mut(service_id)
                .filter(|entry| entry.registration == registration)?;

            if circuit_state.is_some() {
                entry.health.circuit_state = circuit_state;
            }
            let change = match outcome {
                CheckOutcome::Passed => entry.health.record_success(elapsed, &entry.settings),
                CheckOutcome::Failed(error) => {
                    debug!(
                        service_id,
                        error = %error,
                        consecutive_failures = entry.health.consecutive_failures + 1,
                        "Health check failed"
                    );
                    entry
                        .health
                        .record_failure(elapsed, error.to_string(), &entry.settings)
                }
                CheckOutcome::Unchecked => {
                    entry.health.mark_unchecked("no health check configured")
                }
            };
            let alert = change.and_then(|change| self.take_alert(entry, change));
            (change, alert, entry.health.clone())
        };

        self.report(service_id, change, alert);
        Some(snapshot)
    }

    async fn probe(&self, check: &HealthCheck, timeout: Duration) -> Result<(), HealthCheckError> {
        let probe = async {
            match check {
                HealthCheck::Probe(probe) => probe.check().await,
                HealthCheck::Http(http) => match &self.http_client {
                    Ok(client) => http.probe(client).await,
                    Err(reason) => Err(HealthCheckError::Transport(reason.clone())),
                },
            }
        };

        // A late result is dropped along with the probe future
        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(HealthCheckError::Timeout(timeout)),
        }
    }

    /// Observer path for breaker transitions. Notifications are delivered
    /// outside the breaker's lock and may arrive out of order, so the
    /// breaker's current state is mirrored rather than the notified one.
    fn apply_circuit_state(&self, service_id: &str, registration: u64, notified: CircuitState) {
        let (change, alert) = {
            let mut services = self.services.write();
            let Some(entry) = services
                .get_mut(service_id)
                .filter(|entry| entry.registration == registration)
            else {
                return;
            };
            let Some(state) = entry.descriptor.circuit_breaker.as_ref().map(|cb| cb.state())
            else {
                return;
            };
            if state != notified {
                debug!(
                    service_id,
                    notified = %notified,
                    current = %state,
                    "Stale circuit notification, mirroring current state"
                );
            }
            let change = entry.health.apply_circuit_state(state, &entry.settings);
            let alert = change.and_then(|change| self.take_alert(entry, change));
            (change, alert)
        };

        self.report(service_id, change, alert);
    }

    /// Builds an alert for a degradation unless one went out recently
    fn take_alert(&self, entry: &mut ServiceEntry, (from, to): StatusChange) -> Option<HealthAlert> {
        if !to.is_degradation_from(from) {
            return None;
        }

        let now = Instant::now();
        if let Some(last) = entry.last_alert_at {
            if now.duration_since(last) < self.config.min_alert_interval {
                debug!(
                    service_id = %entry.descriptor.id,
                    from = %from,
                    to = %to,
                    "Alert throttled"
                );
                return None;
            }
        }
        entry.last_alert_at = Some(now);

        Some(HealthAlert {
            service_id: entry.descriptor.id.clone(),
            service_name: entry.descriptor.name.clone(),
            previous: from,
            current: to,
            message: entry.health.message.clone(),
            raised_at: Utc::now(),
        })
    }

    fn report(&self, service_id: &str, change: Option<StatusChange>, alert: Option<HealthAlert>) {
        if let Some((from, to)) = change {
            if to.is_degradation_from(from) {
                warn!(service_id, from = %from, to = %to, "🏥 Service health degraded");
            } else {
                info!(service_id, from = %from, to = %to, "🏥 Service health changed");
            }
        }
        if let Some(alert) = alert {
            self.alert_handler.on_alert(&alert);
        }
    }

    fn spawn_check_task(
        self: &Arc<Self>,
        service_id: String,
        registration: u64,
        interval: Duration,
    ) -> JoinHandle<()> {
        let weak: Weak<MonitorInner> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.run_check(&service_id, registration).await.is_none() {
                    break;
                }
            }
            debug!(service_id = %service_id, "Health check task stopped");
        })
    }
}

/// Registry, scheduler and aggregator of service health.
///
/// Construct one per process and share it by reference or `Arc`. Dropping the
/// monitor cancels every check task.
pub struct ServiceHealthMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for ServiceHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHealthMonitor")
            .field("config", &self.inner.config)
            .field("services", &self.inner.services.read().len())
            .finish()
    }
}

impl ServiceHealthMonitor {
    /// Monitor that logs alerts through `tracing`
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_alert_handler(config, Arc::new(LoggingAlertHandler))
    }

    /// Monitor with a custom alert handler. If the HTTP client cannot be
    /// built, the error is logged and endpoint checks report it as a failure.
    pub fn with_alert_handler(config: MonitorConfig, alert_handler: Arc<dyn AlertHandler>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("roster-resilience/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                error!(error = %e, "❌ Failed to build HTTP client for endpoint health checks");
                format!("HTTP client unavailable: {e}")
            });
        Self::from_parts(config, alert_handler, http_client)
    }

    /// Monitor using a caller-configured HTTP client for endpoint checks
    pub fn with_http_client(
        config: MonitorConfig,
        alert_handler: Arc<dyn AlertHandler>,
        http_client: reqwest::Client,
    ) -> Self {
        Self::from_parts(config, alert_handler, Ok(http_client))
    }

    fn from_parts(
        config: MonitorConfig,
        alert_handler: Arc<dyn AlertHandler>,
        http_client: Result<reqwest::Client, String>,
    ) -> Self {
        info!(
            interval_ms = config.defaults.interval.as_millis() as u64,
            timeout_ms = config.defaults.timeout.as_millis() as u64,
            min_alert_interval_ms = config.min_alert_interval.as_millis() as u64,
            "🏥 Service health monitor initialized"
        );

        Self {
            inner: Arc::new(MonitorInner {
                config,
                services: RwLock::new(HashMap::new()),
                alert_handler,
                http_client,
                next_registration: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Register a service, run its first check and start periodic checks.
    ///
    /// Returns the health after the first check.
    pub async fn register_service(
        &self,
        descriptor: ServiceDescriptor,
        options: ServiceCheckOptions,
    ) -> Result<ServiceHealth, MonitorError> {
        let service_id = descriptor.id.clone();
        let settings = options.resolve(&self.inner.config.defaults);
        settings
            .validate()
            .map_err(|reason| MonitorError::InvalidOptions {
                service_id: service_id.clone(),
                reason,
            })?;

        let registration = self.inner.next_registration.fetch_add(1, Ordering::Relaxed);
        let breaker = descriptor.circuit_breaker.clone();
        let interval = settings.interval;

        {
            let mut services = self.inner.services.write();
            if services.contains_key(&service_id) {
                return Err(MonitorError::ServiceAlreadyRegistered(service_id));
            }

            let mut health = ServiceHealth::new(&service_id, &descriptor.name);
            health.circuit_state = breaker.as_ref().map(|cb| cb.state());

            services.insert(
                service_id.clone(),
                ServiceEntry {
                    registration,
                    descriptor,
                    settings,
                    health,
                    last_alert_at: None,
                    check_lock: Arc::new(tokio::sync::Mutex::new(())),
                    task: None,
                    observer_id: None,
                },
            );
        }

        let observer_id = breaker.as_ref().map(|breaker| {
            let weak = Arc::downgrade(&self.inner);
            let observed_id = service_id.clone();
            let observer: Arc<dyn CircuitStateObserver> = Arc::new(
                move |_: &str, _: CircuitState, to: CircuitState| {
                    if let Some(inner) = weak.upgrade() {
                        inner.apply_circuit_state(&observed_id, registration, to);
                    }
                },
            );
            breaker.add_observer(observer)
        });
        let task = self
            .inner
            .spawn_check_task(service_id.clone(), registration, interval);

        let orphaned = {
            let mut services = self.inner.services.write();
            match services
                .get_mut(&service_id)
                .filter(|entry| entry.registration == registration)
            {
                Some(entry) => {
                    entry.task = Some(task);
                    entry.observer_id = observer_id;
                    None
                }
                None => Some(Attachments {
                    task: Some(task),
                    observer: breaker.clone().zip(observer_id),
                }),
            }
        };
        if let Some(orphaned) = orphaned {
            // Unregistered while we were attaching
            orphaned.release();
            return Err(MonitorError::ServiceNotFound(service_id));
        }

        info!(
            service_id = %service_id,
            interval_ms = interval.as_millis() as u64,
            circuit_breaker = breaker.as_ref().map(|cb| cb.name()).unwrap_or("none"),
            "🏥 Service registered for health monitoring"
        );

        let health = self.inner.run_check(&service_id, registration).await;
        health.ok_or(MonitorError::ServiceNotFound(service_id))
    }

    /// Stop monitoring a service. Returns false when it was not registered.
    pub fn unregister_service(&self, service_id: &str) -> bool {
        let removed = self.inner.services.write().remove(service_id);

        match removed {
            Some(mut entry) => {
                entry.take_attachments().release();
                info!(service_id, "🗑️ Service unregistered from health monitoring");
                true
            }
            None => false,
        }
    }

    /// Run one check now, outside the regular schedule
    pub async fn check_service(&self, service_id: &str) -> Result<ServiceHealth, MonitorError> {
        let registration = self
            .inner
            .services
            .read()
            .get(service_id)
            .map(|entry| entry.registration)
            .ok_or_else(|| MonitorError::ServiceNotFound(service_id.to_string()))?;

        self.inner
            .run_check(service_id, registration)
            .await
            .ok_or_else(|| MonitorError::ServiceNotFound(service_id.to_string()))
    }

    /// Operator override of a service's status
    pub fn set_service_status(
        &self,
        service_id: &str,
        status: HealthStatus,
        message: Option<String>,
    ) -> Result<ServiceHealth, MonitorError> {
        let (change, alert, snapshot) = {
            let mut services = self.inner.services.write();
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| MonitorError::ServiceNotFound(service_id.to_string()))?;

            let change = entry.health.force_status(status, message, &entry.settings);
            let alert = change.and_then(|change| self.inner.take_alert(entry, change));
            (change, alert, entry.health.clone())
        };

        info!(service_id, status = %status, "🔧 Service status set manually");
        self.inner.report(service_id, change, alert);
        Ok(snapshot)
    }

    /// Operator "reset circuit" for the breaker attached to a service
    pub fn reset_circuit(&self, service_id: &str) -> Result<(), MonitorError> {
        let breaker = {
            let services = self.inner.services.read();
            let entry = services
                .get(service_id)
                .ok_or_else(|| MonitorError::ServiceNotFound(service_id.to_string()))?;
            entry
                .descriptor
                .circuit_breaker
                .clone()
                .ok_or_else(|| MonitorError::NoCircuitBreaker(service_id.to_string()))?
        };

        // Observers re-enter the registry, so the lock must be released here
        breaker.reset();
        Ok(())
    }

    pub fn get_service_health(&self, service_id: &str) -> Option<ServiceHealth> {
        self.inner
            .services
            .read()
            .get(service_id)
            .map(|entry| entry.health.clone())
    }

    pub fn get_service_descriptor(&self, service_id: &str) -> Option<ServiceDescriptor> {
        self.inner
            .services
            .read()
            .get(service_id)
            .map(|entry| entry.descriptor.clone())
    }

    /// Health of every registered service, ordered by id
    pub fn get_all_services_health(&self) -> Vec<ServiceHealth> {
        self.services_where(|_| true)
    }

    pub fn get_degraded_services(&self) -> Vec<ServiceHealth> {
        self.services_where(|status| status == HealthStatus::Degraded)
    }

    pub fn get_unhealthy_services(&self) -> Vec<ServiceHealth> {
        self.services_where(|status| status == HealthStatus::Unhealthy)
    }

    pub fn get_system_health(&self) -> SystemHealth {
        let services = self.inner.services.read();
        SystemHealth::from_statuses(services.values().map(|entry| entry.health.status))
    }

    fn services_where(&self, predicate: impl Fn(HealthStatus) -> bool) -> Vec<ServiceHealth> {
        let mut matching: Vec<ServiceHealth> = self
            .inner
            .services
            .read()
            .values()
            .filter(|entry| predicate(entry.health.status))
            .map(|entry| entry.health.clone())
            .collect();
        matching.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        matching
    }

    /// Cancel every check task and detach breaker observers. Health records
    /// stay queryable. Idempotent.
    pub fn dispose(&self) {
        let attachments: Vec<Attachments> = self
            .inner
            .services
            .write()
            .values_mut()
            .map(ServiceEntry::take_attachments)
            .collect();

        let cancelled = attachments.iter().filter(|a| a.task.is_some()).count();
        for attachment in attachments {
            attachment.release();
        }
        if cancelled > 0 {
            info!(cancelled, "🛑 Service health monitor disposed");
        }
    }
}

impl Drop for ServiceHealthMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}
