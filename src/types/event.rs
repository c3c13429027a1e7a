//! Event types distributed to connected sessions
//!
//! Durable events are assigned an order number by the event log at commit
//! time. Ephemeral events (presence, historical batches) are broadcast
//! directly and never appended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of events that flow through the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message was posted to a room
    #[serde(rename = "new_message")]
    MessageCreated,
    /// A user opened an event stream
    UserJoined,
    /// A user's event stream closed
    UserLeft,
    /// A room was created
    RoomCreated,
    /// A room was deleted
    RoomDeleted,
    /// A page of scrollback wrapped into one event
    HistoricalBatch,
}

impl EventKind {
    /// Durable kinds go through the event log and carry their own order number
    pub fn is_durable(self) -> bool {
        matches!(
            self,
            EventKind::MessageCreated | EventKind::RoomCreated | EventKind::RoomDeleted
        )
    }

    /// Wire discriminator, used as the SSE `event:` field
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageCreated => "new_message",
            EventKind::UserJoined => "user_joined",
            EventKind::UserLeft => "user_left",
            EventKind::RoomCreated => "room_created",
            EventKind::RoomDeleted => "room_deleted",
            EventKind::HistoricalBatch => "historical_batch",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    /// Order number assigned by the event log. Ephemeral batches carry the
    /// order of the last event they wrap.
    #[serde(rename = "order", default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<u64>,

    pub occurred_at: DateTime<Utc>,

    pub payload: serde_json::Value,
}

/// Events are shared between every queue they are fanned out to
pub type SharedEvent = Arc<Event>;

impl Event {
    /// Create a durable event with the order number the log assigned
    pub fn durable(kind: EventKind, order_number: u64, payload: serde_json::Value) -> Self {
        Self {
            kind,
            order_number: Some(order_number),
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Create an ephemeral event (never appended to the log)
    pub fn ephemeral(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            order_number: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Wrap a batch of scrollback into a single ephemeral event
    pub fn historical_batch(last_order: Option<u64>, payload: serde_json::Value) -> Self {
        Self {
            kind: EventKind::HistoricalBatch,
            order_number: last_order,
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Order number if this event is durable
    pub fn durable_order(&self) -> Option<u64> {
        if self.kind.is_durable() {
            self.order_number
        } else {
            None
        }
    }

    /// Parse the payload as a specific type
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Serialize event to JSON string (for JSONL)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Payload for presence events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub username: String,
}

/// Payload for room deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDeletedPayload {
    pub room_id: uuid::Uuid,
}
