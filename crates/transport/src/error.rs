//! Error types for the IPC transport.

/// Errors produced while binding, accepting or connecting endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid endpoint name: {0}")]
    InvalidEndpoint(String),

    #[error("endpoint already in use: {0}")]
    AddrInUse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("connection timed out")]
    Timeout,
}
