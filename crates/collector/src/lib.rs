//! Collector side of the trace relay.
//!
//! A [`RelayCollector`] keeps a pool of listening endpoints on one name,
//! serves each connected producer on its own task, and merges every valid
//! frame into a shared [`Messages`] queue. Frames from one connection stay
//! in order; frames from different connections interleave freely.

mod collector;
mod config;
mod connections;
mod messages;

pub use collector::RelayCollector;
pub use config::CollectorConfig;
pub use connections::{ConnectionInfo, ConnectionState};
pub use messages::Messages;

pub use pipetrace_protocol::{MessageFrame, Severity};

use std::time::Duration;

use pipetrace_transport::TransportError;

/// Default number of concurrently served producers.
pub const DEFAULT_MAX_CONCURRENT_CONNECTIONS: usize = 32;

/// Wait before retrying when a listening endpoint cannot be opened.
pub const ENDPOINT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Errors produced when starting a collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no tokio runtime: {0}")]
    Runtime(String),
}
