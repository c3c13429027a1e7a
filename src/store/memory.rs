//! In-memory store projected from the event log

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::ChatStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{Event, EventKind, Message, Room, RoomDeletedPayload};

#[derive(Default)]
struct StoreState {
    rooms: HashMap<Uuid, Room>,
    /// Messages per room in commit order
    messages: HashMap<Uuid, Vec<Message>>,
    /// username -> starred room ids
    stars: HashMap<String, HashSet<Uuid>>,
}

/// Thread-safe in-memory implementation of [`ChatStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages across all rooms
    pub fn message_count(&self) -> usize {
        self.state.read().messages.values().map(Vec::len).sum()
    }
}

impl ChatStore for MemoryStore {
    fn apply(&self, event: &Event) -> StorageResult<()> {
        let mut state = self.state.write();

        match event.kind {
            EventKind::RoomCreated => {
                let room: Room = event.parse_payload()?;
                // Replays are idempotent
                if !state.rooms.contains_key(&room.room_id) {
                    state.messages.entry(room.room_id).or_default();
                    state.rooms.insert(room.room_id, room);
                }
            }

            EventKind::RoomDeleted => {
                let data: RoomDeletedPayload = event.parse_payload()?;
                state.rooms.remove(&data.room_id);
                state.messages.remove(&data.room_id);
                for starred in state.stars.values_mut() {
                    starred.remove(&data.room_id);
                }
            }

            EventKind::MessageCreated => {
                let mut message: Message = event.parse_payload()?;
                message.order = event.order_number;

                if !state.rooms.contains_key(&message.room_id) {
                    warn!(room_id = %message.room_id, order = ?event.order_number, "message for unknown room skipped");
                    return Ok(());
                }

                let room_messages = state.messages.entry(message.room_id).or_default();
                if !room_messages.iter().any(|m| m.id == message.id) {
                    room_messages.push(message);
                }
            }

            EventKind::UserJoined | EventKind::UserLeft | EventKind::HistoricalBatch => {
                return Err(StorageError::Invalid(format!(
                    "{} events are not stored",
                    event.kind
                )));
            }
        }

        Ok(())
    }

    fn rooms(&self) -> StorageResult<Vec<Room>> {
        Ok(self.state.read().rooms.values().cloned().collect())
    }

    fn room(&self, room_id: Uuid) -> StorageResult<Room> {
        self.state
            .read()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("room {}", room_id)))
    }

    fn next_sort_order(&self) -> i64 {
        self.state
            .read()
            .rooms
            .values()
            .map(|room| room.sort_order)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn reorder_rooms(&self, room_ids: &[Uuid]) -> StorageResult<Vec<Room>> {
        let mut state = self.state.write();

        if let Some(missing) = room_ids.iter().find(|id| !state.rooms.contains_key(id)) {
            return Err(StorageError::NotFound(format!("room {}", missing)));
        }

        let mut updated = Vec::with_capacity(room_ids.len());
        for (position, room_id) in room_ids.iter().enumerate() {
            if let Some(room) = state.rooms.get_mut(room_id) {
                room.sort_order = position as i64 + 1;
                updated.push(room.clone());
            }
        }
        Ok(updated)
    }

    fn star_room(&self, username: &str, room_id: Uuid) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.rooms.contains_key(&room_id) {
            return Err(StorageError::NotFound(format!("room {}", room_id)));
        }
        state
            .stars
            .entry(username.to_string())
            .or_default()
            .insert(room_id);
        Ok(())
    }

    fn unstar_room(&self, username: &str, room_id: Uuid) -> StorageResult<()> {
        if let Some(starred) = self.state.write().stars.get_mut(username) {
            starred.remove(&room_id);
        }
        Ok(())
    }

    fn starred_rooms(&self, username: &str) -> HashSet<Uuid> {
        self.state
            .read()
            .stars
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    fn messages_before(
        &self,
        room_id: Uuid,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Message>> {
        let state = self.state.read();
        if !state.rooms.contains_key(&room_id) {
            return Err(StorageError::NotFound(format!("room {}", room_id)));
        }

        let mut page: Vec<Message> = state
            .messages
            .get(&room_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.timestamp < before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        page.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.order.cmp(&a.order)));
        page.truncate(limit);
        Ok(page)
    }
}
