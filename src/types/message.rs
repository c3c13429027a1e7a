//! Chat messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message posted to a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Order number of the event that created this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
}

impl Message {
    pub fn new(room_id: Uuid, username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            username: username.into(),
            message: message.into(),
            timestamp: Utc::now(),
            order: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    pub room_id: Uuid,
    pub message: String,
}
