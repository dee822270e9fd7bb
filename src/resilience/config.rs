//! # Circuit Breaker Configuration
//!
//! Per-breaker thresholds. File-based settings live in
//! [`crate::config::CircuitBreakerSettings`] and convert into this type.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to stay open before admitting a half-open trial call
    pub cooldown: Duration,
}

impl CircuitBreakerConfig {
    /// Create configuration for database operations
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }

    /// Create configuration for external API calls (mail, SMS, payment gateways)
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(45),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.cooldown.is_zero() {
            return Err("cooldown must be greater than 0".to_string());
        }

        if self.cooldown > Duration::from_secs(300) {
            return Err("cooldown should not exceed 300 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let invalid = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = CircuitBreakerConfig {
            cooldown: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = CircuitBreakerConfig {
            cooldown: Duration::from_secs(301),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_preset_configurations() {
        let db = CircuitBreakerConfig::for_database();
        assert_eq!(db.failure_threshold, 5);
        assert!(db.validate().is_ok());

        let api = CircuitBreakerConfig::for_external_api();
        assert_eq!(api.cooldown, Duration::from_secs(45));
        assert!(api.validate().is_ok());
    }
}
