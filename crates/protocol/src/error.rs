//! Error types for the frame codec and wire I/O.

/// Errors produced while encoding or transmitting frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("source must not contain '{delimiter}': {source_name}")]
    InvalidSource {
        source_name: String,
        delimiter: char,
    },

    #[error("protocol error: {0}")]
    Protocol(String),
}
