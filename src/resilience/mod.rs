//! # Resilience Module
//!
//! Fault tolerance primitives for calls into downstream dependencies.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Fail fast against a dependency that keeps failing
//! - **Retry Executor**: Re-run operations whose failure kind is transient
//! - **Manager**: Named breakers built from configuration
//! - **Metrics**: Counters for dashboards and log summaries
//!
//! Breakers and retries are independent; callers compose them. A retry policy
//! that lists [`ErrorKind::CircuitOpen`](crate::error::ErrorKind::CircuitOpen)
//! keeps retrying through an open breaker, one that doesn't gives up at once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_resilience::error::ResilienceError;
//! use roster_resilience::resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryExecutor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let circuit_breaker = CircuitBreaker::new("database", CircuitBreakerConfig::for_database());
//! let retry = RetryExecutor::new("approve_booking", RetryConfig::for_database());
//!
//! let booking_id = retry
//!     .execute(|| {
//!         circuit_breaker.call(|| async {
//!             // transactional write here
//!             Ok::<_, ResilienceError>(42_i64)
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitState, CircuitStateObserver, ObserverId,
};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{BackoffConfig, BackoffSchedule, RetryConfig, RetryExecutor};
