//! Fallback sink for the relay's own transport errors.

/// Receives pre-formatted lines describing relay failures.
///
/// Must never route back into the relay itself.
pub trait FallbackSink: Send + Sync {
    fn write_line(&self, line: &str);
}

impl<F> FallbackSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write_line(&self, line: &str) {
        self(line)
    }
}

/// Writes fallback lines as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FallbackSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::warn!(target: "pipetrace::relay", "{line}");
    }
}
