//! Roomcast Chat Server
//!
//! A chat server that streams room events to every connected client over
//! Server-Sent Events, with a gap-free catch-up protocol: a client that
//! connects late first receives every committed event it missed, in order,
//! and then switches to live delivery without losing or repeating events.
//!
//! # Features
//!
//! - **Totally ordered event log**: every durable event gets a unique,
//!   increasing order number, optionally persisted as JSONL
//! - **One session per identity**: a new connection evicts the old one
//! - **Bounded fan-out**: slow clients never block publishers; dropped
//!   events are recovered from the log
//! - **JWT authentication**: HS256 bearer tokens, bcrypt passwords
//!
//! # Modules
//!
//! - `types`: Events, rooms and messages
//! - `event_log`: Append-only log with order assignment and range queries
//! - `session`: Sessions and the session registry (broadcast fan-out)
//! - `rooms`: In-memory room directory
//! - `store`: Rooms and messages projected from the event log
//! - `connection`: Connection lifecycle and catch-up
//! - `hub`: Write paths tying the pieces together
//! - `auth`: Credential verification
//! - `api`: Axum router, REST and SSE handlers
//! - `config`: Server configuration from the environment
//!
//! # Example
//!
//! ```no_run
//! use roomcast::{ChatHub, EventKind};
//!
//! # async fn run() -> Result<(), roomcast::ChatError> {
//! let hub = ChatHub::in_memory();
//! let mut connection = hub.connect("alice");
//!
//! let room = hub.create_room("general")?;
//! hub.post_message("bob", room.room_id, "hi")?;
//!
//! while let Some(event) = connection.next_event().await {
//!     let event = event?;
//!     if event.kind == EventKind::MessageCreated {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_log;
pub mod hub;
pub mod rooms;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use auth::{AuthError, CredentialVerifier, JwtAuth};
pub use config::ServerConfig;
pub use connection::{Connection, ConnectionController, ConnectionState};
pub use error::{ChatError, ChatResult, StorageError, StorageResult};
pub use event_log::{EventHistory, EventLog, EventLogConfig};
pub use hub::{ChatHub, HubStats};
pub use rooms::RoomDirectory;
pub use session::{BroadcastReport, Session, SessionRegistry, SessionToken};
pub use store::{ChatStore, MemoryStore};
pub use types::{Event, EventKind, Message, Room, SharedEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
