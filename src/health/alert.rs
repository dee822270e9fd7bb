//! Alerts raised when a service's health gets worse.

use crate::health::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A degradation of one service's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub service_id: String,
    pub service_name: String,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub message: Option<String>,
    pub raised_at: DateTime<Utc>,
}

/// Receives throttled degradation alerts from the monitor.
///
/// Called on the checking task with no monitor locks held; implementations
/// should hand slow work (paging, email) off to their own task.
pub trait AlertHandler: Send + Sync {
    fn on_alert(&self, alert: &HealthAlert);
}

impl<F> AlertHandler for F
where
    F: Fn(&HealthAlert) + Send + Sync,
{
    fn on_alert(&self, alert: &HealthAlert) {
        self(alert)
    }
}

/// Default handler: a structured warning per alert
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertHandler;

impl AlertHandler for LoggingAlertHandler {
    fn on_alert(&self, alert: &HealthAlert) {
        warn!(
            service_id = %alert.service_id,
            service_name = %alert.service_name,
            previous = %alert.previous,
            current = %alert.current,
            message = alert.message.as_deref().unwrap_or(""),
            "🚨 Service health degraded"
        );
    }
}
