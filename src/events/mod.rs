//! # Domain Events
//!
//! Decouples state-changing business operations (e.g. "booking approved") from
//! their side effects. A business service commits its write, then hands the
//! resulting events to an [`EventPublisher`], which delivers them through the
//! [`EventBus`] with retries and never fails the committed write.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_resilience::events::{
//!     handler, DomainEvent, EventBus, EventHandlerError, EventMetadata, EventPublisher,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn approve_booking() -> Result<i64, String> { Ok(42) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(EventBus::default());
//! bus.subscribe(
//!     "BOOKING_*",
//!     handler(|event| async move {
//!         println!("notify staff about {}", event.event_type);
//!         Ok::<(), EventHandlerError>(())
//!     }),
//! )?;
//!
//! let publisher = EventPublisher::with_default_policy(bus);
//! let metadata = EventMetadata::new("user-17", "org-3");
//! let booking_id = publisher
//!     .commit_then_publish(approve_booking(), |booking_id| {
//!         vec![DomainEvent::new(
//!             "BOOKING_APPROVED",
//!             json!({ "booking_id": booking_id }),
//!             metadata.follow_on(),
//!         )]
//!     })
//!     .await?;
//! # let _ = booking_id;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod domain_events;
pub mod publisher;
pub mod registry;

pub use bus::{EventBus, EventBusStats, PublishError};
pub use domain_events::{DomainEvent, EventMetadata};
pub use publisher::{EventPublisher, PublishOutcome};
pub use registry::{
    handler, EventHandler, EventHandlerError, EventRegistry, HandlerFuture, RegistryError,
    SubscriptionId,
};
