use std::fmt;

/// Connection state of a producer's drain task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// No connection; waiting out the reconnect interval.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and draining the buffer.
    Connected,
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProducerState::Disconnected => "disconnected",
            ProducerState::Connecting => "connecting",
            ProducerState::Connected => "connected",
        };
        f.write_str(s)
    }
}
