//! Shared helpers for integration tests
#![allow(dead_code)]

pub mod strategies;

use parking_lot::Mutex;
use roster_resilience::health::{
    AlertHandler, HealthAlert, HealthCheckError, MonitorConfig, ServiceDescriptor,
    ServiceHealthMonitor,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A dependency whose health the test flips at will
#[derive(Clone, Default)]
pub struct FakeDependency {
    healthy: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl FakeDependency {
    pub fn healthy() -> Self {
        let dependency = Self::default();
        dependency.set_healthy(true);
        dependency
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn descriptor(&self, id: &str, name: &str) -> ServiceDescriptor {
        let healthy = Arc::clone(&self.healthy);
        let probes = Arc::clone(&self.probes);
        ServiceDescriptor::new(id, name).with_probe(move || {
            probes.fetch_add(1, Ordering::SeqCst);
            let up = healthy.load(Ordering::SeqCst);
            async move {
                if up {
                    Ok(())
                } else {
                    Err(HealthCheckError::failed("connection refused"))
                }
            }
        })
    }
}

/// Alert handler that records every alert
#[derive(Clone, Default)]
pub struct RecordingAlerts {
    alerts: Arc<Mutex<Vec<HealthAlert>>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<HealthAlert> {
        self.alerts.lock().clone()
    }
}

impl AlertHandler for RecordingAlerts {
    fn on_alert(&self, alert: &HealthAlert) {
        self.alerts.lock().push(alert.clone());
    }
}

pub fn monitor_with_alerts(config: MonitorConfig) -> (ServiceHealthMonitor, RecordingAlerts) {
    let alerts = RecordingAlerts::default();
    let monitor = ServiceHealthMonitor::with_alert_handler(config, Arc::new(alerts.clone()));
    (monitor, alerts)
}
