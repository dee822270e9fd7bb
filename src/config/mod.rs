//! # Resilience Configuration
//!
//! Serde-backed settings for the health monitor, circuit breakers, retry
//! policies and the event bus. Every section has defaults, so the embedding
//! application can construct [`ResilienceConfig::default()`] programmatically
//! or load overrides through [`ConfigLoader`].
//!
//! ## File layout
//!
//! ```toml
//! [health]
//! check_interval_ms = 30000
//! check_timeout_ms = 5000
//! unhealthy_threshold = 3
//!
//! [circuit_breakers.default_config]
//! failure_threshold = 5
//! cooldown_ms = 30000
//!
//! [circuit_breakers.component_configs.mailer]
//! failure_threshold = 3
//! cooldown_ms = 60000
//!
//! [retry.events]
//! max_retries = 5
//! retryable = ["timeout", "connection", "subscriber_failed"]
//! ```

pub mod error;
pub mod loader;

use crate::error::ErrorKind;
use crate::health::{CheckSettings, MonitorConfig};
use crate::resilience::{BackoffConfig, CircuitBreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub health: HealthMonitorSettings,
    pub circuit_breakers: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub events: EventBusSettings,
}

impl ResilienceConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.health.validate()?;
        self.circuit_breakers.validate()?;
        self.retry.database.validate("retry.database")?;
        self.retry.events.validate("retry.events")?;

        if self.events.stream_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.stream_capacity",
                0,
                "stream capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Monitor-wide health check defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthMonitorSettings {
    pub check_interval_ms: u64,
    pub check_timeout_ms: u64,
    pub unhealthy_threshold: u32,
    pub degraded_threshold: u32,
    pub healthy_threshold: u32,
    /// Minimum gap between two alerts for the same service
    pub min_alert_interval_ms: u64,
}

impl Default for HealthMonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            check_timeout_ms: 5_000,
            unhealthy_threshold: 3,
            degraded_threshold: 1,
            healthy_threshold: 2,
            min_alert_interval_ms: 300_000,
        }
    }
}

impl HealthMonitorSettings {
    fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("health.check_interval_ms", self.check_interval_ms),
            ("health.check_timeout_ms", self.check_timeout_ms),
            ("health.unhealthy_threshold", u64::from(self.unhealthy_threshold)),
            ("health.degraded_threshold", u64::from(self.degraded_threshold)),
            ("health.healthy_threshold", u64::from(self.healthy_threshold)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            defaults: CheckSettings {
                interval: Duration::from_millis(self.check_interval_ms),
                timeout: Duration::from_millis(self.check_timeout_ms),
                unhealthy_threshold: self.unhealthy_threshold,
                degraded_threshold: self.degraded_threshold,
                healthy_threshold: self.healthy_threshold,
            },
            min_alert_interval: Duration::from_millis(self.min_alert_interval_ms),
        }
    }
}

/// Thresholds for one named circuit breaker
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl CircuitBreakerComponentConfig {
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

/// Circuit breaker defaults plus per-component overrides
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Warn when more breakers than this are created
    pub max_circuit_breakers: usize,
    pub default_config: CircuitBreakerComponentConfig,
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: 50,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Component override if present, otherwise the default
    pub fn config_for_component(&self, component_name: &str) -> &CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .unwrap_or(&self.default_config)
    }

    fn validate(&self) -> ConfigResult<()> {
        let components = std::iter::once(("default_config", &self.default_config)).chain(
            self.component_configs
                .iter()
                .map(|(name, config)| (name.as_str(), config)),
        );
        for (name, component) in components {
            component
                .to_resilience_config()
                .validate()
                .map_err(|reason| {
                    ConfigurationError::invalid_value(
                        format!("circuit_breakers.{name}"),
                        format!(
                            "failure_threshold={}, cooldown_ms={}",
                            component.failure_threshold, component.cooldown_ms
                        ),
                        reason,
                    )
                })?;
        }
        Ok(())
    }
}

/// A retry policy as written in configuration files
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicySettings {
    pub max_retries: u32,
    pub retryable: Vec<ErrorKind>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl RetryPolicySettings {
    fn from_config(config: &RetryConfig) -> Self {
        let mut retryable: Vec<ErrorKind> = config.retryable.iter().copied().collect();
        retryable.sort();
        Self {
            max_retries: config.max_retries,
            retryable,
            base_delay_ms: config.backoff.base_delay.as_millis() as u64,
            max_delay_ms: config.backoff.max_delay.as_millis() as u64,
            backoff_multiplier: config.backoff.multiplier,
            jitter_factor: config.backoff.jitter_factor,
        }
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.retryable.iter().copied()).with_backoff(
            BackoffConfig {
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                multiplier: self.backoff_multiplier,
                jitter_factor: self.jitter_factor,
            },
        )
    }

    fn validate(&self, section: &str) -> ConfigResult<()> {
        if !self.backoff_multiplier.is_finite() {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.backoff_multiplier"),
                self.backoff_multiplier,
                "multiplier must be a finite number",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.backoff_multiplier"),
                self.backoff_multiplier,
                "multiplier below 1.0 would shrink delays",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.jitter_factor"),
                self.jitter_factor,
                "jitter factor must be between 0.0 and 1.0",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.max_delay_ms"),
                self.max_delay_ms,
                "max delay must not be smaller than base delay",
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicySettings {
    fn default() -> Self {
        Self::from_config(&RetryConfig::for_database())
    }
}

/// Retry policies for the primary write and for event publication
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub database: RetryPolicySettings,
    pub events: RetryPolicySettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            database: RetryPolicySettings::from_config(&RetryConfig::for_database()),
            events: RetryPolicySettings::from_config(&RetryConfig::for_event_publication()),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusSettings {
    /// Buffer of the broadcast stream for forwarding consumers
    pub stream_capacity: usize,
    /// Log each failing subscriber rather than an aggregate count
    pub log_subscriber_errors: bool,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            stream_capacity: 1000,
            log_subscriber_errors: true,
        }
    }
}
