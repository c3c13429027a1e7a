//! Data types for the chat server
//!
//! This module contains the records that flow between the event log,
//! the session registry and the HTTP layer.

mod event;
mod message;
mod room;

pub use event::{Event, EventKind, PresencePayload, RoomDeletedPayload, SharedEvent};
pub use message::{CreateMessageRequest, Message};
pub use room::{CreateRoomRequest, ReorderRoomsRequest, Room, RoomListing};

/// Page size for client-initiated message scrollback
pub const SCROLLBACK_PAGE_SIZE: usize = 10;
