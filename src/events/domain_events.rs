//! Domain event envelope published after business writes commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who caused an event and which request it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Shared by every event caused by the same originating action
    pub correlation_id: Uuid,
}

impl EventMetadata {
    /// Metadata for a new user action, with a fresh correlation id
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            organization_id: Some(organization_id.into()),
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Metadata for events raised by the system itself
    pub fn system() -> Self {
        Self {
            user_id: None,
            organization_id: None,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Same actor and correlation, stamped now
    pub fn follow_on(&self) -> Self {
        Self {
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// An immutable fact about a completed business operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Stable across redeliveries; consumers deduplicate on it
    pub event_id: Uuid,
    /// e.g. `BOOKING_APPROVED`
    pub event_type: String,
    pub payload: Value,
    pub metadata: EventMetadata,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, payload: Value, metadata: EventMetadata) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_follow_on_keeps_correlation() {
        let metadata = EventMetadata::new("user-7", "org-1");
        let next = metadata.follow_on();

        assert_eq!(next.correlation_id, metadata.correlation_id);
        assert_eq!(next.user_id.as_deref(), Some("user-7"));
        assert!(next.timestamp >= metadata.timestamp);
        assert_ne!(
            EventMetadata::new("user-7", "org-1").correlation_id,
            metadata.correlation_id
        );
    }

    #[test]
    fn test_event_serializes_with_metadata() {
        let event = DomainEvent::new(
            "BOOKING_APPROVED",
            json!({ "booking_id": 42 }),
            EventMetadata::system(),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "BOOKING_APPROVED");
        assert_eq!(value["payload"]["booking_id"], 42);
        assert!(value["metadata"]["user_id"].is_null());
    }
}
