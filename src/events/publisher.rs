//! # Event Publisher
//!
//! Publication of domain events after a business write has committed.
//!
//! The write and the publication are separate steps: the write happens (and
//! commits) first, then events go out through a permissive retry policy.
//! Publication never fails the caller. When retries run out, or a subscriber
//! rejects the event outright, the event is logged and dropped; the outcome is
//! returned as [`PublishOutcome::Dropped`] for callers that want to record it.

use crate::events::{DomainEvent, EventBus, EventMetadata};
use crate::resilience::{RetryConfig, RetryExecutor};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Result of one publication, after retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered {
        event_id: Uuid,
        attempts: u32,
    },
    Dropped {
        event_id: Uuid,
        attempts: u32,
        error: String,
    },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            PublishOutcome::Delivered { event_id, .. } | PublishOutcome::Dropped { event_id, .. } => {
                *event_id
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Delivered { attempts, .. } | PublishOutcome::Dropped { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Publishes domain events on an [`EventBus`] under a retry policy
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
    retry: RetryExecutor,
}

impl EventPublisher {
    pub fn new(bus: Arc<EventBus>, retry_config: RetryConfig) -> Self {
        Self {
            bus,
            retry: RetryExecutor::new("event_publication", retry_config),
        }
    }

    /// Publisher using [`RetryConfig::for_event_publication`]
    pub fn with_default_policy(bus: Arc<EventBus>) -> Self {
        Self::new(bus, RetryConfig::for_event_publication())
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    /// Build and publish one event. Never fails.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        metadata: EventMetadata,
    ) -> PublishOutcome {
        self.publish_event(DomainEvent::new(event_type, payload, metadata))
            .await
    }

    /// Publish a prepared event. Every retry redelivers the same `event_id`.
    pub async fn publish_event(&self, event: DomainEvent) -> PublishOutcome {
        let mut attempts: u32 = 0;
        let result = self
            .retry
            .execute(|| {
                attempts += 1;
                self.bus.publish(&event)
            })
            .await;

        match result {
            Ok(()) => {
                debug!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    attempts,
                    "Domain event delivered"
                );
                PublishOutcome::Delivered {
                    event_id: event.event_id,
                    attempts,
                }
            }
            Err(publish_error) => {
                error!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    correlation_id = %event.metadata.correlation_id,
                    attempts,
                    error = %publish_error,
                    "📭 Domain event dropped"
                );
                PublishOutcome::Dropped {
                    event_id: event.event_id,
                    attempts,
                    error: publish_error.to_string(),
                }
            }
        }
    }

    /// Publish events one after another, in order
    pub async fn publish_all(&self, events: Vec<DomainEvent>) -> Vec<PublishOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.publish_event(event).await);
        }
        outcomes
    }

    /// Await the business write, then publish the events derived from its
    /// result.
    ///
    /// A failed write publishes nothing and returns the write's error. A
    /// successful write returns its value whatever happens to the events.
    pub async fn commit_then_publish<T, E, Fut, B>(&self, commit: Fut, build_events: B) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        B: FnOnce(&T) -> Vec<DomainEvent>,
    {
        let value = commit.await?;

        let outcomes = self.publish_all(build_events(&value)).await;
        let dropped = outcomes.iter().filter(|o| !o.is_delivered()).count();
        if dropped > 0 {
            debug!(
                published = outcomes.len(),
                dropped,
                "Committed write kept despite dropped events"
            );
        }

        Ok(value)
    }
}
