//! Event Log
//!
//! Sequencing wrapper over durable storage. Every durable event gets a
//! process-wide, strictly increasing order number at commit time, and the
//! log answers range queries by that number.
//!
//! ```text
//! Write Path:
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌────────────┐
//! │ write    │───►│ assign order │───►│ sink.persist │───►│ visible to │
//! │ path     │    │ (next_order) │    │ events.jsonl │    │ readers    │
//! └──────────┘    └──────────────┘    └──────────────┘    └────────────┘
//!
//! Read Path (Startup):
//! ┌───────────────┐    ┌─────────────────┐
//! │ events.jsonl  │───►│ validate order  │───► Ready!
//! └───────────────┘    └─────────────────┘
//! ```

mod sink;
mod store;

pub use sink::{EventSink, JsonlSink, LogFile};
pub use store::{EventHistory, EventLog, EventLogConfig};
