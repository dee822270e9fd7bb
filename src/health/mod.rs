//! # Service Health
//!
//! Health registry for the dependencies a business process talks to.
//!
//! ## Architecture
//!
//! - **Descriptors** ([`ServiceDescriptor`]): identity plus an optional active
//!   check (custom probe or HTTP endpoint) and an optional circuit breaker
//! - **Health records** ([`ServiceHealth`]): status derived through failure and
//!   recovery thresholds, never set directly by callers
//! - **Monitor** ([`ServiceHealthMonitor`]): schedules checks, mirrors breaker
//!   transitions, raises throttled alerts and aggregates [`SystemHealth`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_resilience::health::{
//!     HealthCheckError, MonitorConfig, ServiceCheckOptions, ServiceDescriptor,
//!     ServiceHealthMonitor,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = ServiceHealthMonitor::new(MonitorConfig::default());
//!
//! monitor
//!     .register_service(
//!         ServiceDescriptor::new("notifications", "Notification Service")
//!             .with_http_check("http://notifications.internal/health"),
//!         ServiceCheckOptions::new().with_interval(Duration::from_secs(15)),
//!     )
//!     .await?;
//!
//! println!("system: {}", monitor.get_system_health().status);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod check;
pub mod monitor;
pub mod types;

pub use alert::{AlertHandler, HealthAlert, LoggingAlertHandler};
pub use check::{
    FnProbe, HealthCheck, HealthCheckError, HealthProbe, HttpCheck, ServiceDescriptor,
};
pub use monitor::{
    CheckSettings, MonitorConfig, MonitorError, ServiceCheckOptions, ServiceHealthMonitor,
};
pub use types::{HealthStatus, ServiceHealth, StatusChange, SystemHealth};
