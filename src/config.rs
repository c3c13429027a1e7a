//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default capacity of each session's outbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Default number of events fetched per backlog page
pub const DEFAULT_REPLAY_PAGE_SIZE: usize = 100;

/// Runtime configuration for the chat server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Directory holding `events.jsonl`; in-memory log when unset
    ///
    /// Only the event log is written here. Room reordering and stars are
    /// kept in memory and reset on restart: rooms come back in creation
    /// order with no stars.
    pub data_dir: Option<PathBuf>,
    /// Bounded queue capacity per session
    pub queue_capacity: usize,
    /// Backlog page size used during catch-up
    pub replay_page_size: usize,
    /// SSE keep-alive interval
    pub keep_alive: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            replay_page_size: DEFAULT_REPLAY_PAGE_SIZE,
            keep_alive: Duration::from_secs(15),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    ///
    /// Environment:
    /// - CHAT_BIND_ADDR: listen address (default 0.0.0.0:8080)
    /// - CHAT_DATA_DIR: event log directory (optional, in-memory if unset).
    ///   Room order and stars are not persisted there.
    /// - CHAT_QUEUE_CAPACITY: per-session queue capacity (default 50)
    /// - CHAT_REPLAY_PAGE_SIZE: backlog page size (default 100)
    /// - CHAT_KEEPALIVE_SECS: SSE keep-alive interval (default 15)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = parse_or(&lookup, "CHAT_BIND_ADDR", defaults.bind_addr);
        let data_dir = lookup("CHAT_DATA_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let queue_capacity =
            parse_or(&lookup, "CHAT_QUEUE_CAPACITY", defaults.queue_capacity).max(1);
        let replay_page_size =
            parse_or(&lookup, "CHAT_REPLAY_PAGE_SIZE", defaults.replay_page_size).max(1);
        let keep_alive = Duration::from_secs(parse_or(
            &lookup,
            "CHAT_KEEPALIVE_SECS",
            defaults.keep_alive.as_secs(),
        )
        .max(1));

        Self {
            bind_addr,
            data_dir,
            queue_capacity,
            replay_page_size,
            keep_alive,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable config value");
                default
            }
        },
        None => default,
    }
}
