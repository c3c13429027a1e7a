//! Persistence collaborator for rooms, messages and stars
//!
//! Rooms and messages are a projection of the durable events in the event
//! log: the store is rebuilt at startup by replaying the log, and every
//! committed event is applied to it. Room ordering and stars are plain CRUD
//! that lives only as long as the store.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::event_log::EventLog;
use crate::types::{Event, Message, Room};

/// Storage operations the chat core consumes
pub trait ChatStore: Send + Sync {
    /// Apply a committed durable event to the stored state
    fn apply(&self, event: &Event) -> StorageResult<()>;

    /// All stored rooms, unordered
    fn rooms(&self) -> StorageResult<Vec<Room>>;

    fn room(&self, room_id: Uuid) -> StorageResult<Room>;

    /// Sort order for a newly created room (after every existing one)
    fn next_sort_order(&self) -> i64;

    /// Give each listed room the sort order of its position (1-based),
    /// returning the updated rooms
    fn reorder_rooms(&self, room_ids: &[Uuid]) -> StorageResult<Vec<Room>>;

    fn star_room(&self, username: &str, room_id: Uuid) -> StorageResult<()>;

    fn unstar_room(&self, username: &str, room_id: Uuid) -> StorageResult<()>;

    fn starred_rooms(&self, username: &str) -> HashSet<Uuid>;

    /// Messages of a room strictly older than `before`, newest first
    fn messages_before(
        &self,
        room_id: Uuid,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Message>>;
}

/// Rebuild a store by applying every committed event of the log in order
pub fn replay_log(store: &dyn ChatStore, log: &EventLog) -> StorageResult<usize> {
    let Some(highest) = log.highest_order() else {
        return Ok(0);
    };

    let events = log.range_by_order(None, highest, usize::MAX)?;
    for event in &events {
        store.apply(event)?;
    }
    Ok(events.len())
}
