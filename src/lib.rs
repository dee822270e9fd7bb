#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Roster Resilience
//!
//! Service-resilience and domain-event infrastructure for the roster booking
//! platform (organizations, locations, staff, shifts, bookings).
//!
//! ## Overview
//!
//! Business services talk to a database, a mailer, payment and notification
//! APIs. This crate keeps those calls from turning one slow dependency into a
//! platform outage, and keeps side effects from coupling to the write that
//! caused them.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breakers, their manager, and the retry executor
//! - [`health`] - Service health monitor with active probing and circuit mirroring
//! - [`events`] - Domain event bus and the post-commit publisher
//! - [`config`] - Serde configuration with file and environment overrides
//! - [`error`] - Error kinds and the classification trait retries match on
//! - [`logging`] - Structured `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roster_resilience::config::ResilienceConfig;
//! use roster_resilience::events::{EventBus, EventPublisher};
//! use roster_resilience::health::{ServiceCheckOptions, ServiceDescriptor, ServiceHealthMonitor};
//! use roster_resilience::resilience::CircuitBreakerManager;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! roster_resilience::logging::init_structured_logging();
//! let config = ResilienceConfig::default();
//!
//! let breakers = CircuitBreakerManager::new(config.circuit_breakers.clone());
//! let monitor = ServiceHealthMonitor::new(config.health.to_monitor_config());
//! monitor
//!     .register_service(
//!         ServiceDescriptor::new("database", "Primary Database")
//!             .with_category("storage")
//!             .with_circuit_breaker(breakers.get_circuit_breaker("database")),
//!         ServiceCheckOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//!
//! let bus = Arc::new(EventBus::new(config.events.clone()));
//! let publisher = EventPublisher::new(bus, config.retry.events.to_retry_config());
//! # let _ = publisher;
//! # });
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod resilience;

pub use config::{ConfigLoader, ResilienceConfig};
pub use error::{Classify, ErrorKind, ResilienceError, ResilienceResult};
pub use events::{DomainEvent, EventBus, EventMetadata, EventPublisher, PublishOutcome};
pub use health::{HealthStatus, ServiceDescriptor, ServiceHealth, ServiceHealthMonitor, SystemHealth};
pub use resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerManager, CircuitState, RetryConfig,
    RetryExecutor,
};
