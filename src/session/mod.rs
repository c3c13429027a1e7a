//! Sessions and the session registry
//!
//! A session is one connected client's identity plus a bounded queue of
//! pending events. The registry owns the producer side of every queue; the
//! connection that registered a session owns the consumer side.

mod registry;

pub use registry::{BroadcastReport, SessionRegistry};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::SharedEvent;

/// Distinguishes successive sessions registered under the same identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(u64);

impl SessionToken {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess_{:x}", self.0)
    }
}

/// Flags shared between the registry (producer) and the connection (consumer)
#[derive(Debug, Default)]
pub struct SessionStatus {
    degraded: AtomicBool,
    evicted: AtomicBool,
    dropped: AtomicU64,
}

impl SessionStatus {
    /// Record an event dropped because the queue was full
    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.degraded.store(true, Ordering::Release);
    }

    pub(crate) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Release);
    }

    /// Whether a newer session took over this identity's registry slot
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Whether at least one event was dropped since the flag was last taken
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Clear the degraded flag, returning whether it was set
    pub fn take_degraded(&self) -> bool {
        self.degraded.swap(false, Ordering::AcqRel)
    }

    /// Total events dropped for this session
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of a registered session
pub struct Session {
    identity: String,
    token: SessionToken,
    registered_at: DateTime<Utc>,
    receiver: mpsc::Receiver<SharedEvent>,
    status: Arc<SessionStatus>,
}

impl Session {
    pub(crate) fn new(
        identity: String,
        token: SessionToken,
        receiver: mpsc::Receiver<SharedEvent>,
        status: Arc<SessionStatus>,
    ) -> Self {
        Self {
            identity,
            token,
            registered_at: Utc::now(),
            receiver,
            status,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Wait for the next queued event
    ///
    /// Returns `None` once the queue is closed: the session was evicted by a
    /// newer connection for the same identity, or the registry shut down.
    /// Events still buffered for an evicted session are abandoned.
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        if self.status.is_evicted() {
            self.receiver.close();
            return None;
        }

        let event = self.receiver.recv().await?;
        if self.status.is_evicted() {
            self.receiver.close();
            return None;
        }
        Some(event)
    }

    /// Take a queued event without waiting
    pub fn try_recv(&mut self) -> Option<SharedEvent> {
        if self.status.is_evicted() {
            return None;
        }
        self.receiver.try_recv().ok()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("token", &self.token)
            .field("registered_at", &self.registered_at)
            .field("status", &self.status)
            .finish()
    }
}
