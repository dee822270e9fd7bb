//! Health records and the threshold logic that moves them between states.

use crate::health::CheckSettings;
use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Coarse health classification of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Ordering used for alerting: Healthy < Unknown < Degraded < Unhealthy
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// True when moving from `previous` to `self` makes things worse
    pub fn is_degradation_from(&self, previous: HealthStatus) -> bool {
        self.severity() > previous.severity()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }
}

impl From<CircuitState> for HealthStatus {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Open => HealthStatus::Unhealthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change: (from, to)
pub type StatusChange = (HealthStatus, HealthStatus);

/// Derived health of one registered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service_id: String,
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_healthy: Option<DateTime<Utc>>,
    pub last_unhealthy: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub healthy_checks: u64,
    /// Healthy checks as a percentage of all checks
    pub uptime: f64,
    /// Latency of the last check
    pub response_time: Option<Duration>,
    pub message: Option<String>,
    pub circuit_state: Option<CircuitState>,
}

impl ServiceHealth {
    pub fn new(service_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            name: name.into(),
            status: HealthStatus::Unknown,
            last_checked: None,
            last_healthy: None,
            last_unhealthy: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            healthy_checks: 0,
            uptime: 0.0,
            response_time: None,
            message: None,
            circuit_state: None,
        }
    }

    fn transition(&mut self, to: HealthStatus) -> Option<StatusChange> {
        let from = self.status;
        if from == to {
            return None;
        }
        self.status = to;
        Some((from, to))
    }

    fn recompute_uptime(&mut self) {
        self.uptime = if self.total_checks == 0 {
            0.0
        } else {
            self.healthy_checks as f64 / self.total_checks as f64 * 100.0
        };
    }

    /// Apply a passing check. Promotion to Healthy needs a run of
    /// `healthy_threshold` consecutive successes.
    pub(crate) fn record_success(
        &mut self,
        response_time: Duration,
        settings: &CheckSettings,
    ) -> Option<StatusChange> {
        let now = Utc::now();
        self.total_checks += 1;
        self.healthy_checks += 1;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
        self.last_checked = Some(now);
        self.last_healthy = Some(now);
        self.response_time = Some(response_time);
        self.message = None;
        self.recompute_uptime();

        if self.status != HealthStatus::Healthy
            && self.consecutive_successes >= settings.healthy_threshold
        {
            self.transition(HealthStatus::Healthy)
        } else {
            None
        }
    }

    /// Apply a failing check. The status follows the failure run: Unhealthy
    /// at `unhealthy_threshold`, else Degraded at `degraded_threshold`.
    pub(crate) fn record_failure(
        &mut self,
        response_time: Duration,
        message: String,
        settings: &CheckSettings,
    ) -> Option<StatusChange> {
        let now = Utc::now();
        self.total_checks += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
        self.last_checked = Some(now);
        self.last_unhealthy = Some(now);
        self.response_time = Some(response_time);
        self.message = Some(message);
        self.recompute_uptime();

        if self.consecutive_failures >= settings.unhealthy_threshold {
            self.transition(HealthStatus::Unhealthy)
        } else if self.consecutive_failures >= settings.degraded_threshold {
            self.transition(HealthStatus::Degraded)
        } else {
            None
        }
    }

    /// No check source is configured
    pub(crate) fn mark_unchecked(&mut self, message: &str) -> Option<StatusChange> {
        self.last_checked = Some(Utc::now());
        self.message = Some(message.to_string());
        self.transition(HealthStatus::Unknown)
    }

    /// Mirror the breaker's current state. Counters are seeded like an
    /// override so later checks continue from the mirrored status.
    pub(crate) fn apply_circuit_state(
        &mut self,
        state: CircuitState,
        settings: &CheckSettings,
    ) -> Option<StatusChange> {
        self.circuit_state = Some(state);
        let status = HealthStatus::from(state);
        if self.status == status {
            return None;
        }
        self.seed_counters(status, settings);
        self.message = Some(format!("circuit breaker {state}"));
        self.transition(status)
    }

    /// Operator override. Counters are seeded so the next natural check
    /// continues from the forced status instead of contradicting it.
    pub(crate) fn force_status(
        &mut self,
        status: HealthStatus,
        message: Option<String>,
        settings: &CheckSettings,
    ) -> Option<StatusChange> {
        self.seed_counters(status, settings);
        self.message = message.or_else(|| Some(format!("status set to {status} by operator")));
        self.transition(status)
    }

    /// Counters consistent with `status` under `settings`. Check totals and
    /// uptime are untouched.
    fn seed_counters(&mut self, status: HealthStatus, settings: &CheckSettings) {
        let now = Utc::now();
        match status {
            HealthStatus::Healthy => {
                self.consecutive_successes = settings.healthy_threshold;
                self.consecutive_failures = 0;
                self.last_healthy = Some(now);
            }
            HealthStatus::Degraded => {
                self.consecutive_successes = 0;
                self.consecutive_failures = settings.degraded_threshold;
                self.last_unhealthy = Some(now);
            }
            HealthStatus::Unhealthy => {
                self.consecutive_successes = 0;
                self.consecutive_failures = settings.unhealthy_threshold;
                self.last_unhealthy = Some(now);
            }
            HealthStatus::Unknown => {
                self.consecutive_successes = 0;
                self.consecutive_failures = 0;
            }
        }
    }
}

/// Aggregate health across all registered services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub total_services: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    /// Unhealthy if any service is unhealthy, else Degraded if any is
    /// degraded, else Unknown if services exist but none is healthy, else
    /// Healthy.
    pub fn from_statuses(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
        let mut system = SystemHealth {
            status: HealthStatus::Healthy,
            total_services: 0,
            healthy: 0,
            degraded: 0,
            unhealthy: 0,
            unknown: 0,
            checked_at: Utc::now(),
        };

        for status in statuses {
            system.total_services += 1;
            match status {
                HealthStatus::Healthy => system.healthy += 1,
                HealthStatus::Degraded => system.degraded += 1,
                HealthStatus::Unhealthy => system.unhealthy += 1,
                HealthStatus::Unknown => system.unknown += 1,
            }
        }

        system.status = if system.unhealthy > 0 {
            HealthStatus::Unhealthy
        } else if system.degraded > 0 {
            HealthStatus::Degraded
        } else if system.total_services > 0 && system.healthy == 0 {
            HealthStatus::Unknown
        } else {
            HealthStatus::Healthy
        };

        system
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(unhealthy: u32, degraded: u32, healthy: u32) -> CheckSettings {
        CheckSettings {
            unhealthy_threshold: unhealthy,
            degraded_threshold: degraded,
            healthy_threshold: healthy,
            ..CheckSettings::default()
        }
    }

    fn fail(health: &mut ServiceHealth, settings: &CheckSettings) -> Option<StatusChange> {
        health.record_failure(Duration::from_millis(5), "refused".to_string(), settings)
    }

    fn pass(health: &mut ServiceHealth, settings: &CheckSettings) -> Option<StatusChange> {
        health.record_success(Duration::from_millis(5), settings)
    }

    #[test]
    fn test_severity_ordering() {
        assert!(HealthStatus::Unknown.is_degradation_from(HealthStatus::Healthy));
        assert!(HealthStatus::Degraded.is_degradation_from(HealthStatus::Unknown));
        assert!(HealthStatus::Unhealthy.is_degradation_from(HealthStatus::Degraded));
        assert!(!HealthStatus::Healthy.is_degradation_from(HealthStatus::Unknown));
    }

    #[test]
    fn test_failures_walk_through_degraded_to_unhealthy() {
        let settings = settings(3, 1, 2);
        let mut health = ServiceHealth::new("db", "Database");

        assert_eq!(
            fail(&mut health, &settings),
            Some((HealthStatus::Unknown, HealthStatus::Degraded))
        );
        assert_eq!(fail(&mut health, &settings), None);
        assert_eq!(
            fail(&mut health, &settings),
            Some((HealthStatus::Degraded, HealthStatus::Unhealthy))
        );
        assert_eq!(health.consecutive_failures, 3);
        assert!(health.last_unhealthy.is_some());
    }

    #[test]
    fn test_recovery_needs_consecutive_successes() {
        let settings = settings(2, 1, 3);
        let mut health = ServiceHealth::new("db", "Database");
        fail(&mut health, &settings);
        fail(&mut health, &settings);
        assert_eq!(health.status, HealthStatus::Unhealthy);

        assert_eq!(pass(&mut health, &settings), None);
        assert_eq!(pass(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            pass(&mut health, &settings),
            Some((HealthStatus::Unhealthy, HealthStatus::Healthy))
        );
    }

    #[test]
    fn test_failure_after_partial_recovery_follows_thresholds() {
        let settings = settings(3, 1, 3);
        let mut health = ServiceHealth::new("db", "Database");
        for _ in 0..3 {
            fail(&mut health, &settings);
        }
        assert_eq!(health.status, HealthStatus::Unhealthy);

        assert_eq!(pass(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            (health.consecutive_successes, health.consecutive_failures),
            (1, 0)
        );

        assert_eq!(
            fail(&mut health, &settings),
            Some((HealthStatus::Unhealthy, HealthStatus::Degraded))
        );
        assert_eq!(
            (health.consecutive_successes, health.consecutive_failures),
            (0, 1)
        );

        fail(&mut health, &settings);
        assert_eq!(
            fail(&mut health, &settings),
            Some((HealthStatus::Degraded, HealthStatus::Unhealthy))
        );
        assert_eq!(health.consecutive_failures, 3);
    }

    #[test]
    fn test_failure_below_degraded_threshold_keeps_status() {
        let settings = settings(4, 2, 1);
        let mut health = ServiceHealth::new("db", "Database");
        pass(&mut health, &settings);
        assert_eq!(health.status, HealthStatus::Healthy);

        assert_eq!(fail(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(
            fail(&mut health, &settings),
            Some((HealthStatus::Healthy, HealthStatus::Degraded))
        );
    }

    #[test]
    fn test_uptime_counts_healthy_checks() {
        let settings = settings(3, 1, 2);
        let mut health = ServiceHealth::new("db", "Database");
        fail(&mut health, &settings);
        pass(&mut health, &settings);
        pass(&mut health, &settings);
        fail(&mut health, &settings);

        assert_eq!(health.total_checks, 4);
        assert_eq!(health.healthy_checks, 2);
        assert!((health.uptime - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_force_status_seeds_counters() {
        let settings = settings(3, 1, 2);
        let mut health = ServiceHealth::new("db", "Database");

        health.force_status(HealthStatus::Unhealthy, None, &settings);
        assert_eq!(health.consecutive_failures, 3);
        // A single success does not flip it back
        assert_eq!(pass(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Unhealthy);

        health.force_status(HealthStatus::Healthy, Some("maintenance over".into()), &settings);
        assert_eq!(health.consecutive_successes, 2);
        assert_eq!(health.message.as_deref(), Some("maintenance over"));
        assert_eq!(pass(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_circuit_state_mapping() {
        let settings = settings(3, 1, 2);
        let mut health = ServiceHealth::new("mailer", "Mailer");
        assert_eq!(
            health.apply_circuit_state(CircuitState::Open, &settings),
            Some((HealthStatus::Unknown, HealthStatus::Unhealthy))
        );
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(
            health.apply_circuit_state(CircuitState::HalfOpen, &settings),
            Some((HealthStatus::Unhealthy, HealthStatus::Degraded))
        );
        assert_eq!(
            health.apply_circuit_state(CircuitState::Closed, &settings),
            Some((HealthStatus::Degraded, HealthStatus::Healthy))
        );
        assert_eq!(health.circuit_state, Some(CircuitState::Closed));
        assert_eq!(health.consecutive_successes, 2);
        assert_eq!(health.total_checks, 0);

        assert_eq!(health.apply_circuit_state(CircuitState::Closed, &settings), None);
    }

    #[test]
    fn test_check_after_open_circuit_stays_unhealthy() {
        let settings = settings(3, 1, 2);
        let mut health = ServiceHealth::new("mailer", "Mailer");
        pass(&mut health, &settings);
        health.apply_circuit_state(CircuitState::Open, &settings);

        assert_eq!(fail(&mut health, &settings), None);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_system_health_aggregation() {
        use HealthStatus::*;

        assert_eq!(SystemHealth::from_statuses([]).status, Healthy);
        assert_eq!(SystemHealth::from_statuses([Unknown, Unknown]).status, Unknown);
        assert_eq!(SystemHealth::from_statuses([Healthy, Unknown]).status, Healthy);
        assert_eq!(
            SystemHealth::from_statuses([Healthy, Degraded, Unknown]).status,
            Degraded
        );

        let system = SystemHealth::from_statuses([Healthy, Degraded, Unhealthy, Degraded]);
        assert_eq!(system.status, Unhealthy);
        assert_eq!(system.total_services, 4);
        assert_eq!(system.degraded, 2);
    }
}
