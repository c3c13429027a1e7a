//! ChatHub - wires the event log, store, room directory and registry
//!
//! Every durable write goes through one critical section:
//! validate -> append -> apply to store -> update directory -> broadcast.
//! Holding the write lock across the broadcast keeps live queues in
//! commit order.
//!
//! Once an event is appended it is committed: a failure to apply it to the
//! store is logged and the event is still broadcast, so connected clients
//! see the same history a later catch-up would replay.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{AuthError, CredentialVerifier};
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionController};
use crate::error::{ChatError, ChatResult, StorageError, StorageResult};
use crate::event_log::{EventHistory, EventLog, EventLogConfig};
use crate::rooms::RoomDirectory;
use crate::session::{BroadcastReport, SessionRegistry};
use crate::store::{replay_log, ChatStore, MemoryStore};
use crate::types::{
    Event, EventKind, Message, PresencePayload, Room, RoomDeletedPayload, RoomListing,
    SharedEvent, SCROLLBACK_PAGE_SIZE,
};

/// Upper bound for one `events_between` page
pub const MAX_EVENTS_PAGE: usize = 100;

/// Server counters reported by `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub active_sessions: usize,
    pub dropped_events: u64,
    pub highest_order: Option<u64>,
    pub events: usize,
    pub rooms: usize,
}

pub struct ChatHub {
    log: Arc<EventLog>,
    registry: Arc<SessionRegistry>,
    rooms: RoomDirectory,
    store: Arc<dyn ChatStore>,
    controller: ConnectionController,
    writes: Mutex<()>,
}

impl ChatHub {
    /// Build a hub over an opened log, rebuilding `store` from it
    pub fn new(
        log: Arc<EventLog>,
        store: Arc<dyn ChatStore>,
        config: &ServerConfig,
    ) -> StorageResult<Self> {
        let replayed = replay_log(store.as_ref(), &log)?;

        let rooms = RoomDirectory::new();
        rooms.load(store.rooms()?);

        let hub = Self::assemble(log, store, rooms, config);
        info!(
            events = replayed,
            rooms = hub.rooms.len(),
            queue_capacity = hub.registry.queue_capacity(),
            "chat hub ready"
        );
        Ok(hub)
    }

    /// Open the event log named by `config` with an in-memory store
    pub fn open(config: &ServerConfig) -> StorageResult<Self> {
        let log_config = match &config.data_dir {
            Some(dir) => EventLogConfig::with_data_dir(dir),
            None => EventLogConfig::in_memory(),
        };
        let log = Arc::new(EventLog::open(&log_config)?);
        if let Some(dir) = &config.data_dir {
            info!(data_dir = %dir.display(), "persisting event log; room order and stars stay in memory");
        }
        Self::new(log, Arc::new(MemoryStore::new()), config)
    }

    /// Hub with nothing persisted
    pub fn in_memory() -> Self {
        Self::assemble(
            Arc::new(EventLog::in_memory()),
            Arc::new(MemoryStore::new()),
            RoomDirectory::new(),
            &ServerConfig::default(),
        )
    }

    fn assemble(
        log: Arc<EventLog>,
        store: Arc<dyn ChatStore>,
        rooms: RoomDirectory,
        config: &ServerConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::with_capacity(config.queue_capacity));
        let history: Arc<dyn EventHistory> = log.clone();
        let controller = ConnectionController::new(Arc::clone(&registry), history)
            .with_page_size(config.replay_page_size);

        Self {
            log,
            registry,
            rooms,
            store,
            controller,
            writes: Mutex::new(()),
        }
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    // === Connections ===

    /// Authenticate and connect, announcing the user's presence
    ///
    /// A `user_left` event is broadcast when the connection closes, unless a
    /// newer connection for the same identity replaced it.
    pub fn open_connection(
        &self,
        verifier: &dyn CredentialVerifier,
        credential: Option<&str>,
    ) -> Result<Connection, AuthError> {
        let connection = self.controller.open(verifier, credential)?;
        let identity = connection.identity().to_string();

        let registry = Arc::clone(&self.registry);
        let connection = connection.on_close(move |identity| {
            announce(&registry, EventKind::UserLeft, identity);
        });

        announce(&self.registry, EventKind::UserJoined, &identity);
        Ok(connection)
    }

    /// Connect an already verified identity, without presence events
    pub fn connect(&self, identity: &str) -> Connection {
        self.controller.connect(identity)
    }

    /// Broadcast an event that is not appended to the log
    pub fn broadcast_ephemeral(&self, kind: EventKind, payload: serde_json::Value) -> ChatResult<BroadcastReport> {
        if kind.is_durable() {
            return Err(ChatError::Validation(format!("{} events must be published", kind)));
        }
        Ok(self.registry.broadcast(&Arc::new(Event::ephemeral(kind, payload))))
    }

    /// Close every session (server shutdown)
    pub fn shutdown(&self) -> usize {
        self.registry.close_all()
    }

    // === Write paths ===

    /// Append a durable event and fan it out
    pub fn publish(&self, kind: EventKind, payload: serde_json::Value) -> ChatResult<SharedEvent> {
        let writes = self.writes.lock();
        let event = self.commit(&writes, kind, payload)?;
        self.registry.broadcast(&event);
        Ok(event)
    }

    /// Post a message to an existing room
    pub fn post_message(&self, username: &str, room_id: Uuid, body: &str) -> ChatResult<Message> {
        if body.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".to_string()));
        }

        let writes = self.writes.lock();
        if !self.rooms.contains(room_id) {
            return Err(StorageError::NotFound(format!("room {}", room_id)).into());
        }

        let mut message = Message::new(room_id, username, body);
        let event = self.commit(&writes, EventKind::MessageCreated, to_payload(&message)?)?;
        message.order = event.order_number;
        self.registry.broadcast(&event);

        Ok(message)
    }

    /// Create a room with a unique, non-empty name
    pub fn create_room(&self, name: &str) -> ChatResult<Room> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("room name must not be empty".to_string()));
        }

        let writes = self.writes.lock();
        if self.rooms.contains_name(name) {
            return Err(StorageError::Conflict(format!("room '{}' already exists", name)).into());
        }

        let room = Room::new(name, self.store.next_sort_order());
        let event = self.commit(&writes, EventKind::RoomCreated, to_payload(&room)?)?;
        self.rooms.add(room.clone());
        self.registry.broadcast(&event);

        info!(room_id = %room.room_id, name = %room.name, "room created");
        Ok(room)
    }

    pub fn delete_room(&self, room_id: Uuid) -> ChatResult<()> {
        let writes = self.writes.lock();
        if !self.rooms.contains(room_id) {
            return Err(StorageError::NotFound(format!("room {}", room_id)).into());
        }

        let event = self.commit(
            &writes,
            EventKind::RoomDeleted,
            to_payload(&RoomDeletedPayload { room_id })?,
        )?;
        self.rooms.remove(room_id);
        self.registry.broadcast(&event);

        info!(room_id = %room_id, "room deleted");
        Ok(())
    }

    /// Give the listed rooms the sort order of their position
    pub fn reorder_rooms(&self, room_ids: &[Uuid]) -> ChatResult<Vec<Room>> {
        let _writes = self.writes.lock();
        let updated = self.store.reorder_rooms(room_ids)?;
        for room in &updated {
            self.rooms.add(room.clone());
        }
        Ok(updated)
    }

    pub fn star_room(&self, username: &str, room_id: Uuid) -> ChatResult<()> {
        Ok(self.store.star_room(username, room_id)?)
    }

    pub fn unstar_room(&self, username: &str, room_id: Uuid) -> ChatResult<()> {
        Ok(self.store.unstar_room(username, room_id)?)
    }

    // === Reads ===

    pub fn room(&self, room_id: Uuid) -> ChatResult<Room> {
        Ok(self.store.room(room_id)?)
    }

    /// Rooms in display order, flagged with the user's stars
    pub fn list_rooms(&self, username: &str) -> Vec<RoomListing> {
        let starred = self.store.starred_rooms(username);
        self.rooms
            .list()
            .into_iter()
            .map(|room| RoomListing {
                starred: starred.contains(&room.room_id),
                room,
            })
            .collect()
    }

    /// One page of scrollback older than `before`, as a single batch event
    pub fn messages_before(&self, room_id: Uuid, before: Option<DateTime<Utc>>) -> ChatResult<Event> {
        let before = before.unwrap_or_else(Utc::now);
        let messages = self
            .store
            .messages_before(room_id, before, SCROLLBACK_PAGE_SIZE)?;
        let last_order = messages.last().and_then(|m| m.order);

        Ok(Event::historical_batch(
            last_order,
            json!({ "room_id": room_id, "messages": messages }),
        ))
    }

    /// Durable events in `(after, until]`, at most `limit` (1..=100)
    pub fn events_between(
        &self,
        after: Option<u64>,
        until: Option<u64>,
        limit: usize,
    ) -> ChatResult<Vec<SharedEvent>> {
        let Some(until) = until.or_else(|| self.log.highest_order()) else {
            return Ok(Vec::new());
        };
        let limit = limit.clamp(1, MAX_EVENTS_PAGE);
        Ok(self.log.range_by_order(after, until, limit)?)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            active_sessions: self.registry.session_count(),
            dropped_events: self.registry.dropped_total(),
            highest_order: self.log.highest_order(),
            events: self.log.len(),
            rooms: self.rooms.len(),
        }
    }

    /// Append and project a durable event. Caller holds the write lock.
    ///
    /// Only the append can fail the write. The store catches up with a
    /// missed event when it is rebuilt from the log.
    fn commit(
        &self,
        _writes: &MutexGuard<'_, ()>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> ChatResult<SharedEvent> {
        let event = self.log.append(kind, payload)?;
        if let Err(e) = self.store.apply(&event) {
            error!(order = ?event.order_number, kind = %kind, error = %e, "failed to apply committed event");
        }
        Ok(event)
    }
}

fn announce(registry: &SessionRegistry, kind: EventKind, username: &str) {
    let payload = PresencePayload {
        username: username.to_string(),
    };
    let payload = serde_json::to_value(&payload).unwrap_or_else(|_| json!({ "username": username }));
    registry.broadcast(&Arc::new(Event::ephemeral(kind, payload)));
}

fn to_payload<T: Serialize>(value: &T) -> ChatResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Store that accepts reads but cannot apply events
    struct ReadOnlyStore(MemoryStore);

    impl ChatStore for ReadOnlyStore {
        fn apply(&self, _event: &Event) -> StorageResult<()> {
            Err(StorageError::Invalid("store is read-only".to_string()))
        }

        fn rooms(&self) -> StorageResult<Vec<Room>> {
            self.0.rooms()
        }

        fn room(&self, room_id: Uuid) -> StorageResult<Room> {
            self.0.room(room_id)
        }

        fn next_sort_order(&self) -> i64 {
            self.0.next_sort_order()
        }

        fn reorder_rooms(&self, room_ids: &[Uuid]) -> StorageResult<Vec<Room>> {
            self.0.reorder_rooms(room_ids)
        }

        fn star_room(&self, username: &str, room_id: Uuid) -> StorageResult<()> {
            self.0.star_room(username, room_id)
        }

        fn unstar_room(&self, username: &str, room_id: Uuid) -> StorageResult<()> {
            self.0.unstar_room(username, room_id)
        }

        fn starred_rooms(&self, username: &str) -> HashSet<Uuid> {
            self.0.starred_rooms(username)
        }

        fn messages_before(
            &self,
            room_id: Uuid,
            before: DateTime<Utc>,
            limit: usize,
        ) -> StorageResult<Vec<Message>> {
            self.0.messages_before(room_id, before, limit)
        }
    }

    struct NameVerifier;

    impl CredentialVerifier for NameVerifier {
        fn verify(&self, credential: &str) -> Result<String, AuthError> {
            credential
                .strip_prefix("Bearer ")
                .map(str::to_string)
                .ok_or(AuthError::MissingToken)
        }
    }

    async fn next(connection: &mut Connection) -> SharedEvent {
        tokio::time::timeout(Duration::from_secs(1), connection.next_event())
            .await
            .expect("connection stalled")
            .expect("connection closed")
            .unwrap()
    }

    #[test]
    fn test_create_room_validation() {
        let hub = ChatHub::in_memory();
        let room = hub.create_room("  general ").unwrap();
        assert_eq!(room.name, "general");
        assert_eq!(room.sort_order, 1);

        assert!(matches!(hub.create_room("   "), Err(ChatError::Validation(_))));
        let duplicate = hub.create_room("General").unwrap_err();
        assert_eq!(duplicate.code(), "CONFLICT");

        assert_eq!(hub.create_room("random").unwrap().sort_order, 2);
        assert_eq!(hub.log().highest_order(), Some(2));
    }

    #[test]
    fn test_post_message_requires_room_and_body() {
        let hub = ChatHub::in_memory();
        let room = hub.create_room("general").unwrap();

        let missing = hub.post_message("alice", Uuid::new_v4(), "hi").unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
        assert!(matches!(
            hub.post_message("alice", room.room_id, "  "),
            Err(ChatError::Validation(_))
        ));

        let message = hub.post_message("alice", room.room_id, "hi").unwrap();
        assert_eq!(message.order, Some(2));
        // Failed writes do not consume order numbers
        assert_eq!(hub.log().len(), 2);
    }

    #[test]
    fn test_delete_room_removes_directory_entry() {
        let hub = ChatHub::in_memory();
        let room = hub.create_room("general").unwrap();
        hub.post_message("alice", room.room_id, "hi").unwrap();

        hub.delete_room(room.room_id).unwrap();
        assert!(hub.rooms().is_empty());
        assert_eq!(hub.delete_room(room.room_id).unwrap_err().code(), "NOT_FOUND");
        assert_eq!(
            hub.post_message("alice", room.room_id, "late").unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_list_rooms_with_order_and_stars() {
        let hub = ChatHub::in_memory();
        let a = hub.create_room("a").unwrap();
        let b = hub.create_room("b").unwrap();

        hub.reorder_rooms(&[b.room_id, a.room_id]).unwrap();
        hub.star_room("alice", a.room_id).unwrap();

        let listing = hub.list_rooms("alice");
        assert_eq!(listing[0].room.room_id, b.room_id);
        assert!(!listing[0].starred);
        assert!(listing[1].starred);
        assert!(hub.list_rooms("bob").iter().all(|r| !r.starred));

        hub.unstar_room("alice", a.room_id).unwrap();
        assert!(hub.list_rooms("alice").iter().all(|r| !r.starred));
    }

    #[test]
    fn test_messages_before_returns_batch() {
        let hub = ChatHub::in_memory();
        let room = hub.create_room("general").unwrap();
        for i in 0..12 {
            hub.post_message("alice", room.room_id, &format!("m{}", i)).unwrap();
        }

        let batch = hub.messages_before(room.room_id, None).unwrap();
        assert_eq!(batch.kind, EventKind::HistoricalBatch);
        assert_eq!(batch.payload["messages"].as_array().unwrap().len(), 10);
        assert!(batch.order_number.is_some());
        assert_eq!(batch.durable_order(), None);
    }

    #[test]
    fn test_events_between_clamps_limit() {
        let hub = ChatHub::in_memory();
        assert!(hub.events_between(None, None, 10).unwrap().is_empty());

        let room = hub.create_room("general").unwrap();
        for i in 0..5 {
            hub.post_message("alice", room.room_id, &i.to_string()).unwrap();
        }

        let orders: Vec<u64> = hub
            .events_between(Some(2), None, 0)
            .unwrap()
            .iter()
            .filter_map(|e| e.order_number)
            .collect();
        assert_eq!(orders, vec![3]);

        assert_eq!(hub.events_between(None, Some(4), 1000).unwrap().len(), 4);
    }

    #[test]
    fn test_broadcast_ephemeral_rejects_durable_kinds() {
        let hub = ChatHub::in_memory();
        let result = hub.broadcast_ephemeral(EventKind::MessageCreated, json!({}));
        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert!(hub.log().is_empty());
    }

    #[tokio::test]
    async fn test_presence_is_announced() {
        let hub = ChatHub::in_memory();
        let mut alice = hub.connect("alice");

        let bob = hub.open_connection(&NameVerifier, Some("Bearer bob")).unwrap();
        let joined = next(&mut alice).await;
        assert_eq!(joined.kind, EventKind::UserJoined);
        assert_eq!(joined.payload["username"], "bob");

        drop(bob);
        let left = next(&mut alice).await;
        assert_eq!(left.kind, EventKind::UserLeft);
        assert_eq!(hub.stats().active_sessions, 1);
    }

    #[tokio::test]
    async fn test_replaced_connection_does_not_announce_departure() {
        let hub = ChatHub::in_memory();
        let mut watcher = hub.connect("watcher");

        let first = hub.open_connection(&NameVerifier, Some("Bearer bob")).unwrap();
        let _second = hub.open_connection(&NameVerifier, Some("Bearer bob")).unwrap();
        drop(first);

        let room = hub.create_room("general").unwrap();

        assert_eq!(next(&mut watcher).await.kind, EventKind::UserJoined);
        assert_eq!(next(&mut watcher).await.kind, EventKind::UserJoined);
        let created = next(&mut watcher).await;
        assert_eq!(created.kind, EventKind::RoomCreated);
        assert_eq!(created.payload["id"], json!(room.room_id));
    }

    #[test]
    fn test_reopen_rebuilds_rooms_and_messages() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };

        let room_id = {
            let hub = ChatHub::open(&config).unwrap();
            let room = hub.create_room("general").unwrap();
            hub.post_message("alice", room.room_id, "persisted").unwrap();
            room.room_id
        };

        let hub = ChatHub::open(&config).unwrap();
        assert!(hub.rooms().contains(room_id));
        assert_eq!(hub.log().highest_order(), Some(2));

        let batch = hub.messages_before(room_id, None).unwrap();
        assert_eq!(batch.payload["messages"][0]["message"], "persisted");
        assert_eq!(batch.order_number, Some(2));

        let message = hub.post_message("bob", room_id, "next").unwrap();
        assert_eq!(message.order, Some(3));
    }

    #[tokio::test]
    async fn test_store_failure_still_broadcasts_committed_event() {
        let hub = ChatHub::new(
            Arc::new(EventLog::in_memory()),
            Arc::new(ReadOnlyStore(MemoryStore::new())),
            &ServerConfig::default(),
        )
        .unwrap();
        let mut connection = hub.connect("alice");

        let event = hub
            .publish(EventKind::MessageCreated, json!({ "message": "kept" }))
            .unwrap();
        assert_eq!(event.order_number, Some(1));
        assert_eq!(hub.log().highest_order(), Some(1));

        let received = next(&mut connection).await;
        assert_eq!(received.order_number, Some(1));
        assert_eq!(received.payload["message"], "kept");
    }

    #[test]
    fn test_room_lookup() {
        let hub = ChatHub::in_memory();
        let room = hub.create_room("general").unwrap();

        assert_eq!(hub.room(room.room_id).unwrap().name, "general");
        let missing = hub.room(Uuid::new_v4()).unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[test]
    fn test_reorder_and_stars_are_not_kept_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };

        {
            let hub = ChatHub::open(&config).unwrap();
            let a = hub.create_room("a").unwrap();
            let b = hub.create_room("b").unwrap();
            hub.reorder_rooms(&[b.room_id, a.room_id]).unwrap();
            hub.star_room("alice", a.room_id).unwrap();

            let names: Vec<_> = hub.list_rooms("alice").into_iter().map(|l| l.room.name).collect();
            assert_eq!(names, vec!["b", "a"]);
        }

        // Only the event log is durable; rooms come back in creation order
        let hub = ChatHub::open(&config).unwrap();
        let listing = hub.list_rooms("alice");
        let names: Vec<_> = listing.iter().map(|l| l.room.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(listing.iter().all(|l| !l.starred));
    }
}
