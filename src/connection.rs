//! Connection lifecycle controller
//!
//! Drives one client connection through
//! `Authenticating -> Registering -> Replaying -> Live -> Closed`.
//!
//! The session is registered *before* the backlog boundary is read. Every
//! durable event at or below the boundary is replayed from the event log;
//! everything broadcast after registration arrives through the session
//! queue. Queue entries inside the range already read from the log are
//! discarded. Orders delivered from the queue above that range are
//! remembered until the range grows over them, so a resync never sends
//! them again. Broadcasts may reach a queue out of order without being lost.
//!
//! ```text
//! register ──► boundary = highest_order ──► replay (0, boundary] in pages
//!                                                 │
//!                    queue (broadcasts since register) ──► live
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use futures::Stream;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, CredentialVerifier};
use crate::config::DEFAULT_REPLAY_PAGE_SIZE;
use crate::error::{ChatResult, StorageResult};
use crate::event_log::EventHistory;
use crate::session::{Session, SessionRegistry, SessionToken};
use crate::types::SharedEvent;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Authenticating,
    Registering,
    Replaying,
    Live,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Registering => "registering",
            ConnectionState::Replaying => "replaying",
            ConnectionState::Live => "live",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Live set size at which gaps below it are checked against the log
const LIVE_GAP_CHECK_AT: usize = 64;

/// Called with the identity when a connection closes while still current
pub type CloseHook = Box<dyn FnOnce(&str) + Send>;

/// Opens connections against a shared registry and event history
pub struct ConnectionController {
    registry: Arc<SessionRegistry>,
    log: Arc<dyn EventHistory>,
    page_size: usize,
}

impl ConnectionController {
    pub fn new(registry: Arc<SessionRegistry>, log: Arc<dyn EventHistory>) -> Self {
        Self {
            registry,
            log,
            page_size: DEFAULT_REPLAY_PAGE_SIZE,
        }
    }

    /// Set the number of events fetched per backlog page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Authenticate the caller, then connect them
    ///
    /// On failure no session is created.
    pub fn open(
        &self,
        verifier: &dyn CredentialVerifier,
        credential: Option<&str>,
    ) -> Result<Connection, AuthError> {
        debug!(state = %ConnectionState::Authenticating, "connection opening");

        let identity = credential
            .ok_or(AuthError::MissingToken)
            .and_then(|credential| verifier.verify(credential))
            .inspect_err(|e| {
                info!(error = %e, state = %ConnectionState::Closed, "connection rejected");
            })?;

        Ok(self.connect(&identity))
    }

    /// Register a session for an already verified identity
    ///
    /// Every event broadcast after this returns is delivered by the
    /// connection exactly once, after the backlog.
    pub fn connect(&self, identity: &str) -> Connection {
        debug!(identity, state = %ConnectionState::Registering, "connection registering");

        let session = self.registry.register(identity);
        // Read only after registering, see module docs
        let boundary = self.log.highest_order();

        info!(
            identity,
            session = %session.token(),
            boundary = ?boundary,
            "connection replaying backlog"
        );

        Connection {
            state: ConnectionState::Replaying,
            session,
            registry: Arc::clone(&self.registry),
            log: Arc::clone(&self.log),
            page_size: self.page_size,
            boundary,
            catch_up: boundary.map(|target| CatchUp { cursor: None, target }),
            pending: VecDeque::new(),
            replayed_to: boundary,
            live_delivered: BTreeSet::new(),
            on_close: None,
        }
    }
}

/// Pages still to read from the event log
#[derive(Debug, Clone, Copy)]
struct CatchUp {
    cursor: Option<u64>,
    target: u64,
}

/// One client's connection, yielding backlog then live events
pub struct Connection {
    state: ConnectionState,
    session: Session,
    registry: Arc<SessionRegistry>,
    log: Arc<dyn EventHistory>,
    page_size: usize,
    boundary: Option<u64>,
    catch_up: Option<CatchUp>,
    /// Events fetched from the log, not yet delivered
    pending: VecDeque<SharedEvent>,
    /// Every durable order up to here is delivered or scheduled from the log
    replayed_to: Option<u64>,
    /// Orders above `replayed_to` already delivered from the queue
    live_delivered: BTreeSet<u64>,
    on_close: Option<CloseHook>,
}

impl Connection {
    /// Run `hook` when this connection closes, unless it was superseded
    pub fn on_close(mut self, hook: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> &str {
        self.session.identity()
    }

    pub fn token(&self) -> SessionToken {
        self.session.token()
    }

    /// Highest order that existed when the session registered
    pub fn boundary(&self) -> Option<u64> {
        self.boundary
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Next event for the client, `None` once the connection is closed
    ///
    /// A storage failure while reading the backlog is returned once and
    /// closes the connection.
    pub async fn next_event(&mut self) -> Option<ChatResult<SharedEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if self.delivered_live(&event) {
                    continue;
                }
                return Some(Ok(event));
            }

            match self.state {
                ConnectionState::Replaying | ConnectionState::Live if self.catch_up.is_some() => {
                    if let Err(e) = self.fetch_page() {
                        warn!(identity = %self.identity(), error = %e, "catch-up failed");
                        self.close();
                        return Some(Err(e.into()));
                    }
                }
                ConnectionState::Replaying => self.transition(ConnectionState::Live),
                ConnectionState::Live => {
                    if self.session.status().take_degraded() {
                        self.begin_resync();
                        continue;
                    }
                    self.compact_live_delivered();

                    match self.session.recv().await {
                        Some(event) if self.already_delivered(&event) => continue,
                        Some(event) => {
                            if let Some(order) = event.durable_order() {
                                self.live_delivered.insert(order);
                            }
                            return Some(Ok(event));
                        }
                        None => {
                            self.close();
                            return None;
                        }
                    }
                }
                _ => return None,
            }
        }
    }

    /// Convert into a stream of events for the transport
    pub fn into_stream(self) -> impl Stream<Item = ChatResult<SharedEvent>> + Send {
        let mut connection = self;
        async_stream::stream! {
            while let Some(item) = connection.next_event().await {
                yield item;
            }
        }
    }

    /// Unregister the session and stop streaming. Runs once.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.transition(ConnectionState::Closed);
        self.pending.clear();
        self.catch_up = None;

        let identity = self.session.identity().to_string();
        if self.registry.unregister(&identity, self.session.token()) {
            if let Some(hook) = self.on_close.take() {
                hook(&identity);
            }
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        debug!(identity = %self.identity(), from = %self.state, to = %to, "connection state");
        self.state = to;
    }

    fn fetch_page(&mut self) -> StorageResult<()> {
        let Some(CatchUp { cursor, target }) = self.catch_up else {
            return Ok(());
        };

        let page = self.log.range_by_order(cursor, target, self.page_size)?;
        let last = page.last().and_then(|e| e.order_number);

        self.catch_up = match last {
            Some(last) if last < target && page.len() == self.page_size => Some(CatchUp {
                cursor: Some(last),
                target,
            }),
            _ => None,
        };
        self.pending.extend(page);
        Ok(())
    }

    /// Re-read the log after the queue dropped events
    fn begin_resync(&mut self) {
        let Some(highest) = self.log.highest_order() else {
            return;
        };
        if self.replayed_to.is_some_and(|r| r >= highest) {
            return;
        }

        warn!(
            identity = %self.identity(),
            from = ?self.replayed_to,
            to = highest,
            dropped = self.session.status().dropped(),
            "session degraded, resynchronising from event log"
        );
        self.catch_up = Some(CatchUp {
            cursor: self.replayed_to,
            target: highest,
        });
        self.replayed_to = Some(highest);
    }

    /// Queue entry already covered by a log read or an earlier delivery
    fn already_delivered(&self, event: &SharedEvent) -> bool {
        match event.durable_order() {
            Some(order) => {
                self.replayed_to.is_some_and(|r| order <= r)
                    || self.live_delivered.contains(&order)
            }
            None => false,
        }
    }

    fn delivered_live(&self, event: &SharedEvent) -> bool {
        event
            .durable_order()
            .is_some_and(|order| self.live_delivered.contains(&order))
    }

    /// Fold live orders that continue the replayed range into it
    ///
    /// Gaps left by burned order numbers never fill from the queue, so once
    /// the set grows the log is asked whether anything was committed there.
    fn compact_live_delivered(&mut self) {
        let mut floor = self.replayed_to;
        if let Some(floor) = floor {
            self.live_delivered = self.live_delivered.split_off(&floor.saturating_add(1));
        }

        while let Some(&first) = self.live_delivered.first() {
            if first == floor.map_or(1, |f| f + 1) {
                self.live_delivered.pop_first();
                floor = Some(first);
                continue;
            }
            if self.live_delivered.len() < LIVE_GAP_CHECK_AT {
                break;
            }
            match self.log.range_by_order(floor, first - 1, 1) {
                Ok(events) if events.is_empty() => floor = Some(first - 1),
                _ => break,
            }
        }

        self.replayed_to = floor;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("boundary", &self.boundary)
            .field("replayed_to", &self.replayed_to)
            .field("live_delivered", &self.live_delivered.len())
            .finish()
    }
}
