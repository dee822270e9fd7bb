//! # Event Registry
//!
//! Pattern-matching subscription table for domain events.
//!
//! ## Pattern Matching Rules
//!
//! - **Exact match**: `"BOOKING_APPROVED"` matches only `"BOOKING_APPROVED"`
//! - **Prefix**: `"BOOKING_*"` matches `"BOOKING_APPROVED"`, `"BOOKING_CANCELLED"`, etc.
//! - **Global**: `"*"` matches all events
//!
//! A `*` anywhere but the end of a pattern is rejected.

use crate::error::{Classify, ErrorKind};
use crate::events::DomainEvent;
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Future returned by an [`EventHandler`]
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), EventHandlerError>> + Send>>;

/// Event handler function type
///
/// Handlers receive their own clone of the event and run concurrently with
/// the other handlers matching it.
pub type EventHandler = Arc<dyn Fn(DomainEvent) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`]
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventHandlerError>> + Send + 'static,
{
    Arc::new(move |event: DomainEvent| -> HandlerFuture { Box::pin(f(event)) })
}

/// Errors that can occur during registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid event pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failure reported by a handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error in event handler: {reason}")]
pub struct EventHandlerError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl EventHandlerError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Failure worth redelivering
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::SubscriberFailed, reason)
    }
}

impl Classify for EventHandlerError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Handle for removing a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
enum EventPattern {
    Exact(String),
    Prefix(String),
    All,
}

impl EventPattern {
    fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("Pattern cannot be empty"));
        }
        if pattern == "*" {
            return Ok(EventPattern::All);
        }

        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => {
                Err(invalid("Wildcard is only allowed as the last character"))
            }
            Some(prefix) => Ok(EventPattern::Prefix(prefix.to_string())),
            None if pattern.contains('*') => {
                Err(invalid("Wildcard is only allowed as the last character"))
            }
            None => Ok(EventPattern::Exact(pattern.to_string())),
        }
    }

    fn matches(&self, event_type: &str) -> bool {
        match self {
            EventPattern::Exact(name) => name == event_type,
            EventPattern::Prefix(prefix) => event_type.starts_with(prefix.as_str()),
            EventPattern::All => true,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    matcher: EventPattern,
    handler: EventHandler,
}

/// A handler selected for one event, with the pattern that selected it
#[derive(Clone)]
pub struct MatchedHandler {
    pub pattern: String,
    handler: EventHandler,
}

/// Failure of one handler during dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub pattern: String,
    pub error: EventHandlerError,
}

/// Subscription table in registration order
#[derive(Default)]
pub struct EventRegistry {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to an event pattern
    pub fn subscribe(
        &mut self,
        pattern: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionId, RegistryError> {
        let matcher = EventPattern::parse(pattern)?;
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        self.subscriptions.push(Subscription {
            id,
            pattern: pattern.to_string(),
            matcher,
            handler,
        });
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    /// Handlers whose pattern matches `event_type`, in subscription order
    pub fn handlers_for(&self, event_type: &str) -> Vec<MatchedHandler> {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.matcher.matches(event_type))
            .map(|subscription| MatchedHandler {
                pattern: subscription.pattern.clone(),
                handler: Arc::clone(&subscription.handler),
            })
            .collect()
    }

    /// Number of distinct patterns with at least one subscription
    pub fn pattern_count(&self) -> usize {
        let mut patterns: Vec<&str> = self
            .subscriptions
            .iter()
            .map(|subscription| subscription.pattern.as_str())
            .collect();
        patterns.sort_unstable();
        patterns.dedup();
        patterns.len()
    }

    pub fn handler_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("pattern_count", &self.pattern_count())
            .field("handler_count", &self.handler_count())
            .finish()
    }
}

/// Run every handler concurrently; all of them run even if some fail
pub async fn dispatch(handlers: Vec<MatchedHandler>, event: &DomainEvent) -> Vec<HandlerFailure> {
    let futures = handlers.into_iter().map(|matched| {
        let event = event.clone();
        async move {
            (matched.handler)(event)
                .await
                .err()
                .map(|error| HandlerFailure {
                    pattern: matched.pattern,
                    error,
                })
        }
    });

    join_all(futures).await.into_iter().flatten().collect()
}
