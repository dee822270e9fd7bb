use proptest::prelude::*;
use roster_resilience::health::HealthStatus;
use roster_resilience::resilience::BackoffConfig;
use std::time::Duration;

/// Any health status
pub fn health_status_strategy() -> impl Strategy<Value = HealthStatus> {
    prop_oneof![
        Just(HealthStatus::Healthy),
        Just(HealthStatus::Degraded),
        Just(HealthStatus::Unhealthy),
        Just(HealthStatus::Unknown),
    ]
}

/// Backoff settings within the ranges configuration validation accepts
pub fn backoff_strategy() -> impl Strategy<Value = BackoffConfig> {
    (0u64..2_000, 0u64..60_000, 1.0f64..4.0, 0.0f64..=1.0).prop_map(
        |(base_ms, extra_ms, multiplier, jitter_factor)| BackoffConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms + extra_ms),
            multiplier,
            jitter_factor,
        },
    )
}

/// (unhealthy, degraded, healthy) thresholds
pub fn thresholds_strategy() -> impl Strategy<Value = (u32, u32, u32)> {
    (1u32..6, 1u32..6, 1u32..4)
}
