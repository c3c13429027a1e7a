//! Event Log - order assignment and range queries
//!
//! Appends are serialized by a writer lock that owns the order counter and
//! the durable sink. An event becomes visible to readers only after the sink
//! has committed it, so `highest_order` and `range_by_order` never observe
//! an in-flight order number.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::sink::{EventSink, JsonlSink};
use crate::error::{StorageError, StorageResult};
use crate::types::{Event, EventKind, SharedEvent};

/// Configuration for the EventLog
#[derive(Debug, Clone, Default)]
pub struct EventLogConfig {
    /// Directory holding `events.jsonl`; `None` keeps the log in memory
    pub data_dir: Option<PathBuf>,
}

impl EventLogConfig {
    /// Config persisting to the given directory
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: Some(data_dir.as_ref().to_path_buf()),
        }
    }

    /// Config for a purely in-memory log
    pub fn in_memory() -> Self {
        Self { data_dir: None }
    }

    /// Get path to events.jsonl
    pub fn events_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("events.jsonl"))
    }
}

/// Read side of the event log used by catch-up
pub trait EventHistory: Send + Sync {
    /// Greatest committed order number, `None` if nothing was committed yet
    fn highest_order(&self) -> Option<u64>;

    /// Events with order in `(from_exclusive, to_inclusive]`, ascending,
    /// at most `limit` of them
    fn range_by_order(
        &self,
        from_exclusive: Option<u64>,
        to_inclusive: u64,
        limit: usize,
    ) -> StorageResult<Vec<SharedEvent>>;
}

struct Writer {
    /// Next order number to hand out. Never rewinds, even on failure.
    next_order: u64,
    sink: Option<Box<dyn EventSink>>,
}

/// Append-only, totally ordered log of durable events
pub struct EventLog {
    writer: Mutex<Writer>,
    /// Committed events, ascending by order number
    committed: RwLock<Vec<SharedEvent>>,
}

impl EventLog {
    /// Create an empty log that keeps events in memory only
    pub fn in_memory() -> Self {
        Self::from_parts(None, Vec::new())
    }

    /// Create an empty log committing through the given sink
    pub fn with_sink(sink: Box<dyn EventSink>) -> Self {
        Self::from_parts(Some(sink), Vec::new())
    }

    /// Open the log described by `config`, replaying any existing file
    pub fn open(config: &EventLogConfig) -> StorageResult<Self> {
        let Some(path) = config.events_path() else {
            return Ok(Self::in_memory());
        };

        let existing = JsonlSink::load(&path)?;
        let sink = JsonlSink::open(&path)?;

        info!(
            path = %path.display(),
            events = existing.len(),
            "opened event log"
        );

        Ok(Self::from_parts(Some(Box::new(sink)), existing))
    }

    fn from_parts(sink: Option<Box<dyn EventSink>>, existing: Vec<Event>) -> Self {
        let next_order = existing
            .last()
            .and_then(Event::durable_order)
            .map_or(1, |order| order + 1);

        Self {
            writer: Mutex::new(Writer { next_order, sink }),
            committed: RwLock::new(existing.into_iter().map(Arc::new).collect()),
        }
    }

    /// Persist a durable event and return it with its order number
    ///
    /// Two concurrent appends never share an order number. If the sink
    /// fails the number is burned and the event is never made visible.
    pub fn append(&self, kind: EventKind, payload: serde_json::Value) -> StorageResult<SharedEvent> {
        if !kind.is_durable() {
            return Err(StorageError::Invalid(format!(
                "{} events are ephemeral and cannot be appended",
                kind
            )));
        }

        let mut writer = self.writer.lock();
        let order = writer.next_order;
        writer.next_order += 1;

        let event = Event::durable(kind, order, payload);
        if let Some(sink) = writer.sink.as_mut() {
            if let Err(e) = sink.persist(&event) {
                error!(order, kind = %kind, error = %e, "event append failed");
                return Err(e);
            }
        }

        let event = Arc::new(event);
        // Still holding the writer lock, so commits become visible in order
        self.committed.write().push(Arc::clone(&event));
        debug!(order, kind = %kind, "event committed");

        Ok(event)
    }

    /// Events with order in `(from_exclusive, to_inclusive]`, ascending,
    /// at most `limit` of them
    pub fn range_by_order(
        &self,
        from_exclusive: Option<u64>,
        to_inclusive: u64,
        limit: usize,
    ) -> StorageResult<Vec<SharedEvent>> {
        let committed = self.committed.read();
        let lower = from_exclusive.unwrap_or(0);

        let start = committed.partition_point(|e| order_of(e) <= lower);
        let events = committed[start..]
            .iter()
            .take_while(|e| order_of(e) <= to_inclusive)
            .take(limit)
            .cloned()
            .collect();

        Ok(events)
    }

    /// Greatest committed order number, `None` if nothing was committed yet
    pub fn highest_order(&self) -> Option<u64> {
        self.committed.read().last().map(|e| order_of(e))
    }

    /// Number of committed events
    pub fn len(&self) -> usize {
        self.committed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventHistory for EventLog {
    fn highest_order(&self) -> Option<u64> {
        EventLog::highest_order(self)
    }

    fn range_by_order(
        &self,
        from_exclusive: Option<u64>,
        to_inclusive: u64,
        limit: usize,
    ) -> StorageResult<Vec<SharedEvent>> {
        EventLog::range_by_order(self, from_exclusive, to_inclusive, limit)
    }
}

fn order_of(event: &SharedEvent) -> u64 {
    // Only durable events with assigned orders are ever committed
    event.order_number.unwrap_or_default()
}
