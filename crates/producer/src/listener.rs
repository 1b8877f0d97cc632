//! Trace listeners: the capability a [`TraceSource`](crate::TraceSource)
//! writes to.

use pipetrace_protocol::Severity;

/// Destination for trace events.
pub trait TraceListener: Send + Sync {
    fn trace(&self, severity: Severity, source: &str, message: &str);

    /// Flushes any buffered output. Called on registry teardown.
    fn flush(&self) {}
}

/// Forwards trace events to the `tracing` subscriber of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl TraceListener for TracingListener {
    fn trace(&self, severity: Severity, source: &str, message: &str) {
        match severity {
            Severity::Critical | Severity::Error => {
                tracing::error!(source, severity = %severity, "{message}")
            }
            Severity::Warning => tracing::warn!(source, "{message}"),
            Severity::Information => tracing::info!(source, "{message}"),
            Severity::Verbose => tracing::debug!(source, "{message}"),
            Severity::Unspecified => tracing::trace!(source, "{message}"),
        }
    }
}
