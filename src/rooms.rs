//! Room Directory - in-memory view of the rooms held in storage
//!
//! Seeded from storage at startup and updated inside the same write
//! operation that persists a room change. Reads take a shared lock only.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::types::Room;

/// Read-mostly mapping of room id to room metadata
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<Uuid, Room>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the directory contents with the rooms loaded from storage
    pub fn load(&self, all_rooms: impl IntoIterator<Item = Room>) {
        let loaded: HashMap<Uuid, Room> = all_rooms
            .into_iter()
            .map(|room| (room.room_id, room))
            .collect();
        *self.rooms.write() = loaded;
    }

    /// Add (or refresh) a room persisted by the caller
    pub fn add(&self, room: Room) {
        self.rooms.write().insert(room.room_id, room);
    }

    /// Remove a room deleted from storage by the caller
    pub fn remove(&self, room_id: Uuid) -> Option<Room> {
        self.rooms.write().remove(&room_id)
    }

    /// All rooms ordered by sort order, then name
    pub fn list(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.read().values().cloned().collect();
        rooms.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        rooms
    }

    pub fn get(&self, room_id: Uuid) -> Option<Room> {
        self.rooms.read().get(&room_id).cloned()
    }

    pub fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.read().contains_key(&room_id)
    }

    /// Whether a room with this name (case-insensitive) exists
    pub fn contains_name(&self, name: &str) -> bool {
        self.rooms
            .read()
            .values()
            .any(|room| room.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_replaces_contents() {
        let directory = RoomDirectory::new();
        directory.add(Room::new("stale", 1));

        directory.load(vec![Room::new("general", 2), Room::new("random", 1)]);

        let names: Vec<String> = directory.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["random", "general"]);
    }

    #[test]
    fn test_add_get_remove() {
        let directory = RoomDirectory::new();
        let room = Room::new("general", 1);
        let id = room.room_id;

        directory.add(room.clone());
        assert!(directory.contains(id));
        assert!(directory.contains_name("GENERAL"));
        assert_eq!(directory.get(id), Some(room));

        assert!(directory.remove(id).is_some());
        assert!(directory.is_empty());
        assert!(directory.remove(id).is_none());
    }
}
