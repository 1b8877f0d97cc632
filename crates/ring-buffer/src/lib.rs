//! Fixed-capacity circular buffer with overwrite-oldest semantics.
//!
//! The buffer never applies backpressure: once full, every push evicts the
//! oldest unread entry and bumps a discard counter. Producers on a logging
//! hot path can enqueue without ever blocking on a slow consumer.

mod buffer;

pub use buffer::RingBuffer;

/// Smallest capacity accepted by [`RingBuffer::new`].
pub const MIN_CAPACITY: usize = 2;

/// Errors produced when constructing a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingBufferError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
