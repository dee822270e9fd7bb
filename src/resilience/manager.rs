//! # Circuit Breaker Manager
//!
//! Get-or-create registry of named circuit breakers configured from
//! [`CircuitBreakerSettings`]. Business services ask the manager for the
//! breaker guarding their dependency; operator tooling resets breakers by name.

use crate::config::CircuitBreakerSettings;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Manager for the circuit breakers of one process
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by component name
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,

    settings: Arc<CircuitBreakerSettings>,
}

impl CircuitBreakerManager {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        info!(
            component_overrides = settings.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    /// Get or create circuit breaker for a component
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(component_name) {
            return Arc::clone(breaker.value());
        }

        let current_count = self.circuit_breakers.len();
        if current_count >= self.settings.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count,
                max_allowed = self.settings.max_circuit_breakers,
                "🚨 Circuit breaker limit exceeded"
            );
        }

        // entry() holds the shard lock, so concurrent callers share one instance
        self.circuit_breakers
            .entry(component_name.to_string())
            .or_insert_with(|| {
                let config = self
                    .settings
                    .config_for_component(component_name)
                    .to_resilience_config();
                Arc::new(CircuitBreaker::new(component_name, config))
            })
            .value()
            .clone()
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Get metrics for a specific circuit breaker
    pub fn get_component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers
            .get(component_name)
            .map(|breaker| breaker.metrics())
    }

    /// Get system-wide circuit breaker metrics
    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Operator "reset circuit" by name. Returns false for unknown components.
    pub fn reset(&self, component_name: &str) -> bool {
        // Clone out so observers run without the shard lock held
        let breaker = self
            .circuit_breakers
            .get(component_name)
            .map(|entry| Arc::clone(entry.value()));

        match breaker {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Remove circuit breaker for a component
    pub fn remove_circuit_breaker(&self, component_name: &str) -> bool {
        if self.circuit_breakers.remove(component_name).is_some() {
            info!(
                component = component_name,
                remaining_count = self.circuit_breakers.len(),
                "🗑️ Removed circuit breaker"
            );
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerComponentConfig;
    use crate::resilience::CircuitState;
    use std::time::Duration;

    fn create_test_settings() -> CircuitBreakerSettings {
        let mut settings = CircuitBreakerSettings::default();
        settings.component_configs.insert(
            "mailer".to_string(),
            CircuitBreakerComponentConfig {
                failure_threshold: 1,
                cooldown_ms: 60_000,
            },
        );
        settings
    }

    #[test]
    fn test_get_or_create_circuit_breaker() {
        let manager = CircuitBreakerManager::new(create_test_settings());
        assert!(manager.list_components().is_empty());

        let breaker1 = manager.get_circuit_breaker("database");
        let breaker2 = manager.get_circuit_breaker("database");
        assert!(Arc::ptr_eq(&breaker1, &breaker2));
        assert_eq!(breaker1.config().failure_threshold, 5);

        let mailer = manager.get_circuit_breaker("mailer");
        assert_eq!(mailer.config().failure_threshold, 1);
        assert_eq!(mailer.config().cooldown, Duration::from_secs(60));

        assert_eq!(manager.list_components(), vec!["database", "mailer"]);
    }

    #[tokio::test]
    async fn test_reset_by_name() {
        let manager = CircuitBreakerManager::new(create_test_settings());
        let mailer = manager.get_circuit_breaker("mailer");

        let _ = mailer.call(|| async { Err::<(), _>("smtp down") }).await;
        assert_eq!(mailer.state(), CircuitState::Open);
        assert_eq!(manager.get_system_metrics().open_circuits(), vec!["mailer"]);

        assert!(manager.reset("mailer"));
        assert_eq!(mailer.state(), CircuitState::Closed);
        assert!(!manager.reset("unknown"));
    }

    #[test]
    fn test_remove_circuit_breaker() {
        let manager = CircuitBreakerManager::new(create_test_settings());
        manager.get_circuit_breaker("database");
        assert!(manager.get_component_metrics("database").is_some());
        assert!(manager.remove_circuit_breaker("database"));
        assert!(!manager.remove_circuit_breaker("database"));
        assert!(manager.get_component_metrics("database").is_none());
    }
}
