//! Session registry - the directory of live sessions and broadcast fan-out

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{Session, SessionStatus, SessionToken};
use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::types::SharedEvent;

/// Producer side of a session, owned by the registry
struct SessionSlot {
    token: SessionToken,
    sender: mpsc::Sender<SharedEvent>,
    status: Arc<SessionStatus>,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the event was enqueued for
    pub delivered: usize,
    /// Sessions whose queue was full
    pub dropped: usize,
}

/// Concurrent directory of live sessions, one per identity
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    queue_capacity: usize,
    next_token: AtomicU64,
    dropped_total: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry with the default queue capacity (50)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a registry whose sessions get queues of `queue_capacity`
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            next_token: AtomicU64::new(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Register a fresh session for `identity`, replacing any existing one
    ///
    /// A replaced session is marked evicted and its queue loses its
    /// producer, so the old connection's `recv` ends and it tears down.
    pub fn register(&self, identity: &str) -> Session {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let status = Arc::new(SessionStatus::default());
        let token = SessionToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));

        let slot = Arc::new(SessionSlot {
            token,
            sender,
            status: Arc::clone(&status),
        });

        let previous = self.sessions.write().insert(identity.to_string(), slot);
        if let Some(previous) = previous {
            previous.status.mark_evicted();
            info!(identity, evicted = %previous.token, session = %token, "session replaced");
        } else {
            info!(identity, session = %token, "session registered");
        }

        Session::new(identity.to_string(), token, receiver, status)
    }

    /// Remove the session for `identity` if `token` is still the current one
    ///
    /// Returns false when the session was already superseded or removed.
    pub fn unregister(&self, identity: &str, token: SessionToken) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(identity) {
            Some(slot) if slot.token == token => {
                sessions.remove(identity);
                info!(identity, session = %token, "session unregistered");
                true
            }
            _ => {
                debug!(identity, session = %token, "ignoring unregister of superseded session");
                false
            }
        }
    }

    /// Enqueue `event` for every registered session without blocking
    ///
    /// A full queue drops the event for that session only and marks it
    /// degraded.
    pub fn broadcast(&self, event: &SharedEvent) -> BroadcastReport {
        let targets: Vec<(String, Arc<SessionSlot>)> = self
            .sessions
            .read()
            .iter()
            .map(|(identity, slot)| (identity.clone(), Arc::clone(slot)))
            .collect();

        let mut report = BroadcastReport::default();
        for (identity, slot) in targets {
            match slot.sender.try_send(Arc::clone(event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    slot.status.record_drop();
                    self.dropped_total.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    warn!(
                        identity = %identity,
                        session = %slot.token,
                        kind = %event.kind,
                        order = ?event.order_number,
                        "session queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(identity = %identity, session = %slot.token, "session queue closed");
                }
            }
        }

        report
    }

    /// Drop every session, closing all queues (server shutdown)
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        info!(sessions = drained.len(), "closing all sessions");
        drained.len()
    }

    /// Whether `identity` currently has a registered session
    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.read().contains_key(identity)
    }

    /// Token of the session currently registered for `identity`
    pub fn current_token(&self, identity: &str) -> Option<SessionToken> {
        self.sessions.read().get(identity).map(|slot| slot.token)
    }

    /// Get active session count
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Events dropped across all sessions since startup
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, EventKind};
    use serde_json::json;
    use std::time::Duration;

    fn event(order: u64) -> SharedEvent {
        Arc::new(Event::durable(
            EventKind::MessageCreated,
            order,
            json!({ "message": order }),
        ))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions_in_order() {
        let registry = SessionRegistry::new();
        let mut alice = registry.register("alice");
        let mut bob = registry.register("bob");

        for order in 1..=3 {
            let report = registry.broadcast(&event(order));
            assert_eq!(report.delivered, 2);
        }

        for session in [&mut alice, &mut bob] {
            for expected in 1..=3 {
                let received = session.recv().await.unwrap();
                assert_eq!(received.order_number, Some(expected));
            }
            assert!(session.try_recv().is_none());
        }
    }

    #[tokio::test]
    async fn test_register_replaces_and_evicts_previous_session() {
        let registry = SessionRegistry::new();
        let mut first = registry.register("alice");
        registry.broadcast(&event(1));

        let mut second = registry.register("alice");
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.current_token("alice"), Some(second.token()));
        assert!(first.status().is_evicted());

        // Pending events of the superseded session are abandoned
        assert!(first.recv().await.is_none());

        registry.broadcast(&event(2));
        assert_eq!(second.recv().await.unwrap().order_number, Some(2));
    }

    #[tokio::test]
    async fn test_evicted_session_wakes_while_waiting() {
        let registry = Arc::new(SessionRegistry::new());
        let mut first = registry.register("alice");

        let waiter = tokio::spawn(async move { first.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _second = registry.register("alice");
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("evicted session should stop waiting")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unregister_ignores_superseded_token() {
        let registry = SessionRegistry::new();
        let first = registry.register("alice");
        let second = registry.register("alice");

        assert!(!registry.unregister("alice", first.token()));
        assert!(registry.contains("alice"));

        assert!(registry.unregister("alice", second.token()));
        assert!(!registry.contains("alice"));
        assert!(!registry.unregister("alice", second.token()));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking_others() {
        let registry = SessionRegistry::with_capacity(2);
        let stalled = registry.register("stalled");
        let mut active = registry.register("active");

        for order in 1..=3 {
            let report = registry.broadcast(&event(order));
            if order <= 2 {
                assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });
            } else {
                assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
            }
            active.recv().await.unwrap();
        }

        assert!(stalled.status().is_degraded());
        assert_eq!(stalled.status().dropped(), 1);
        assert!(!active.status().is_degraded());
        assert_eq!(registry.dropped_total(), 1);

        assert!(stalled.status().take_degraded());
        assert!(!stalled.status().is_degraded());
    }

    #[tokio::test]
    async fn test_close_all_ends_every_session() {
        let registry = SessionRegistry::new();
        let mut alice = registry.register("alice");
        let mut bob = registry.register("bob");

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.session_count(), 0);
        assert!(alice.recv().await.is_none());
        assert!(bob.recv().await.is_none());
    }
}
