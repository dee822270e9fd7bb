mod common;

use common::strategies::*;
use common::FakeDependency;
use proptest::prelude::*;
use roster_resilience::health::{
    HealthStatus, MonitorConfig, ServiceCheckOptions, ServiceHealthMonitor, SystemHealth,
};
use std::time::Duration;

proptest! {
    /// Property: Retry delays never shrink and never exceed the cap
    #[test]
    fn backoff_schedule_is_monotonic_and_capped(backoff in backoff_strategy(), retries in 1usize..20) {
        let delays: Vec<Duration> = backoff.schedule().take(retries).collect();

        prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]), "delays shrank: {:?}", delays);
        prop_assert!(delays.iter().all(|d| *d <= backoff.max_delay));
    }

    /// Property: The system is unhealthy exactly when some service is
    #[test]
    fn system_health_follows_worst_service(statuses in prop::collection::vec(health_status_strategy(), 0..12)) {
        let system = SystemHealth::from_statuses(statuses.iter().copied());

        prop_assert_eq!(system.total_services, statuses.len());
        prop_assert_eq!(
            system.healthy + system.degraded + system.unhealthy + system.unknown,
            statuses.len()
        );
        prop_assert_eq!(
            system.status == HealthStatus::Unhealthy,
            statuses.contains(&HealthStatus::Unhealthy)
        );
        if statuses.is_empty() {
            prop_assert_eq!(system.status, HealthStatus::Healthy);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: A run of failures lands on the status its length implies
    #[test]
    fn failure_run_respects_thresholds((unhealthy, degraded, healthy) in thresholds_strategy(), failures in 1u32..10) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let status = runtime.block_on(async {
            let monitor = ServiceHealthMonitor::new(MonitorConfig::default());
            let dependency = FakeDependency::failing();
            let options = ServiceCheckOptions::new()
                .with_interval(Duration::from_secs(3600))
                .with_thresholds(unhealthy, degraded, healthy);

            let mut health = monitor
                .register_service(dependency.descriptor("db", "Database"), options)
                .await
                .unwrap();
            for _ in 1..failures {
                health = monitor.check_service("db").await.unwrap();
            }
            health.status
        });

        let expected = if failures >= unhealthy {
            HealthStatus::Unhealthy
        } else if failures >= degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unknown
        };
        prop_assert_eq!(status, expected);
    }
}
