//! Room records and room requests

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "id")]
    pub room_id: Uuid,
    pub name: String,
    pub sort_order: i64,
}

impl Room {
    pub fn new(name: impl Into<String>, sort_order: i64) -> Self {
        Self {
            room_id: Uuid::new_v4(),
            name: name.into(),
            sort_order,
        }
    }
}

/// A room as listed for a particular user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomListing {
    #[serde(flatten)]
    pub room: Room,
    pub starred: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRoomsRequest {
    pub room_ids: Vec<Uuid>,
}
