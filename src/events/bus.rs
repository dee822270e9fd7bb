//! # Event Bus
//!
//! In-memory publish/subscribe for domain events.
//!
//! ```text
//! DomainEvent
//!     ↓
//! EventBus::publish
//!     |
//!     +--→ EventRegistry (async handlers)
//!     |         ↓
//!     |    Pattern matching dispatch
//!     |    (exact, prefix, global)
//!     |
//!     +--→ Broadcast stream
//!               ↓
//!          Forwarding consumers (outbox, audit log)
//! ```
//!
//! Unlike a fire-and-forget bus, `publish` reports handler failures so the
//! caller's retry policy can redeliver. A redelivery reaches every matching
//! handler and the stream again; consumers deduplicate on `event_id`.

use crate::config::EventBusSettings;
use crate::error::{Classify, ErrorKind};
use crate::events::registry::{
    dispatch, EventHandler, EventRegistry, HandlerFailure, RegistryError, SubscriptionId,
};
use crate::events::DomainEvent;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Bus counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Publish calls, including redeliveries
    pub events_published: u64,
    /// Individual handler invocations
    pub handler_dispatches: u64,
    pub handler_errors: u64,
    pub stream_deliveries: u64,
    /// Publishes with no stream subscriber attached
    pub stream_drops: u64,
    pub subscription_patterns: usize,
    pub handler_count: usize,
    pub stream_subscribers: usize,
}

/// Publication failed in at least one handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("{failed} of {attempted} subscribers failed for event '{event_type}' ({kind})")]
    SubscribersFailed {
        event_type: String,
        /// Most severe kind among the failures
        kind: ErrorKind,
        failed: usize,
        attempted: usize,
    },
}

impl Classify for PublishError {
    fn kind(&self) -> ErrorKind {
        match self {
            PublishError::SubscribersFailed { kind, .. } => *kind,
        }
    }
}

/// A terminal handler error outranks transient ones, so a policy never keeps
/// redelivering to a subscriber that rejected the event outright.
fn most_severe_kind(failures: &[HandlerFailure]) -> ErrorKind {
    let is_terminal = |kind: ErrorKind| !kind.is_transient() && kind != ErrorKind::SubscriberFailed;

    failures
        .iter()
        .map(|failure| failure.error.kind())
        .find(|kind| is_terminal(*kind))
        .or_else(|| failures.first().map(|failure| failure.error.kind()))
        .unwrap_or(ErrorKind::SubscriberFailed)
}

/// Pattern-matching event bus with a broadcast side channel
pub struct EventBus {
    registry: RwLock<EventRegistry>,
    stream: broadcast::Sender<DomainEvent>,
    settings: EventBusSettings,
    stats: Mutex<EventBusStats>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("EventBus")
            .field("registry_patterns", &registry.pattern_count())
            .field("registry_handlers", &registry.handler_count())
            .field("stream_subscribers", &self.stream.receiver_count())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusSettings::default())
    }
}

impl EventBus {
    pub fn new(settings: EventBusSettings) -> Self {
        // broadcast::channel panics on zero capacity
        let (stream, _) = broadcast::channel(settings.stream_capacity.max(1));

        info!(
            stream_capacity = settings.stream_capacity,
            "📬 Event bus initialized"
        );

        Self {
            registry: RwLock::new(EventRegistry::new()),
            stream,
            settings,
            stats: Mutex::new(EventBusStats::default()),
        }
    }

    /// Subscribe a handler to an exact type, a `PREFIX_*` pattern or `*`
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionId, RegistryError> {
        let id = self.registry.write().subscribe(pattern, handler)?;
        debug!(pattern, "Registered event subscriber");
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.write().unsubscribe(id)
    }

    /// Receiver of every published event, for forwarding consumers.
    ///
    /// Lagging receivers lose the oldest events once `stream_capacity` is
    /// exceeded.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<DomainEvent> {
        debug!("Creating event stream subscriber");
        self.stream.subscribe()
    }

    /// Deliver `event` to every matching handler concurrently, then to the
    /// stream. Fails if any handler failed.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let handlers = self.registry.read().handlers_for(&event.event_type);
        let attempted = handlers.len();

        debug!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            handler_count = attempted,
            "Publishing domain event"
        );

        let failures = if handlers.is_empty() {
            Vec::new()
        } else {
            dispatch(handlers, event).await
        };

        {
            let mut stats = self.stats.lock();
            stats.events_published += 1;
            stats.handler_dispatches += attempted as u64;
            stats.handler_errors += failures.len() as u64;
        }

        self.broadcast(event);

        if failures.is_empty() {
            return Ok(());
        }

        if self.settings.log_subscriber_errors {
            for failure in &failures {
                warn!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    pattern = %failure.pattern,
                    error = %failure.error,
                    "Event handler failed"
                );
            }
        } else {
            warn!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                error_count = failures.len(),
                "Event handlers failed"
            );
        }

        Err(PublishError::SubscribersFailed {
            event_type: event.event_type.clone(),
            kind: most_severe_kind(&failures),
            failed: failures.len(),
            attempted,
        })
    }

    fn broadcast(&self, event: &DomainEvent) {
        match self.stream.send(event.clone()) {
            Ok(receivers) => {
                debug!(event_id = %event.event_id, receivers, "Event sent to stream");
                self.stats.lock().stream_deliveries += 1;
            }
            // Only fails when nobody is listening
            Err(broadcast::error::SendError(_)) => {
                self.stats.lock().stream_drops += 1;
            }
        }
    }

    pub fn stats(&self) -> EventBusStats {
        let mut stats = self.stats.lock().clone();
        let registry = self.registry.read();
        stats.subscription_patterns = registry.pattern_count();
        stats.handler_count = registry.handler_count();
        stats.stream_subscribers = self.stream.receiver_count();
        stats
    }

    /// Drop every handler subscription. Stream receivers are unaffected.
    pub fn clear_subscriptions(&self) {
        info!("Clearing all event bus subscriptions");
        self.registry.write().clear();
    }

    pub fn settings(&self) -> &EventBusSettings {
        &self.settings
    }
}
