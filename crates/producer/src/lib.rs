//! Producer side of the trace relay.
//!
//! A [`RelayProducer`] lives inside the application emitting traces. Trace
//! calls land in a private ring buffer and return immediately; a background
//! task drains the buffer to the collector over the local IPC transport,
//! reconnecting forever when the collector goes away.
//!
//! Transport faults never reach the code emitting traces. They are reported
//! to a [`FallbackSink`] only.

mod config;
mod listener;
mod producer;
mod registry;
mod sink;
mod types;

pub use config::ProducerConfig;
pub use listener::{TraceListener, TracingListener};
pub use producer::RelayProducer;
pub use registry::{TraceRegistry, TraceSource};
pub use sink::{FallbackSink, TracingSink};
pub use types::ProducerState;

pub use pipetrace_protocol::{MessageFrame, Severity};

use std::time::Duration;

/// Ring buffer capacity used when none is configured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Wait between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Errors produced when starting a producer.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no tokio runtime available: {0}")]
    Runtime(String),
}

impl From<pipetrace_ring_buffer::RingBufferError> for ProducerError {
    fn from(err: pipetrace_ring_buffer::RingBufferError) -> Self {
        match err {
            pipetrace_ring_buffer::RingBufferError::InvalidConfiguration(msg) => {
                ProducerError::InvalidConfiguration(msg)
            }
        }
    }
}
