//! Named trace sources and the registry that owns them.
//!
//! The registry is an ordinary value with an explicit lifecycle: create it
//! with [`TraceRegistry::init`], swap the shared listener with
//! [`TraceRegistry::replace_default`], and release everything with
//! [`TraceRegistry::teardown`]. Components receive it by reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use pipetrace_protocol::Severity;

use crate::listener::TraceListener;

/// A named origin of trace events with its own severity switch.
///
/// Cloning is cheap; clones share level and listener.
#[derive(Clone)]
pub struct TraceSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    name: String,
    state: RwLock<SourceState>,
}

struct SourceState {
    level: Severity,
    listener: Arc<dyn TraceListener>,
}

impl TraceSource {
    pub fn new(name: impl Into<String>, level: Severity, listener: Arc<dyn TraceListener>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                name: name.into(),
                state: RwLock::new(SourceState { level, listener }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Least severe level that still passes the switch.
    pub fn level(&self) -> Severity {
        self.read(|s| s.level)
    }

    pub fn set_level(&self, level: Severity) {
        self.write(|s| s.level = level);
    }

    pub fn listener(&self) -> Arc<dyn TraceListener> {
        self.read(|s| Arc::clone(&s.listener))
    }

    pub fn set_listener(&self, listener: Arc<dyn TraceListener>) {
        self.write(|s| s.listener = listener);
    }

    /// Whether an event of `severity` would be forwarded.
    pub fn should_trace(&self, severity: Severity) -> bool {
        severity.passes(self.level())
    }

    /// Forwards the event to the listener if it passes the switch.
    pub fn trace_event(&self, severity: Severity, message: &str) {
        let listener = self.read(|s| severity.passes(s.level).then(|| Arc::clone(&s.listener)));
        if let Some(listener) = listener {
            listener.trace(severity, &self.inner.name, message);
        }
    }

    pub fn critical(&self, message: &str) {
        self.trace_event(Severity::Critical, message);
    }

    pub fn error(&self, message: &str) {
        self.trace_event(Severity::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.trace_event(Severity::Warning, message);
    }

    pub fn information(&self, message: &str) {
        self.trace_event(Severity::Information, message);
    }

    pub fn verbose(&self, message: &str) {
        self.trace_event(Severity::Verbose, message);
    }

    fn read<R>(&self, f: impl FnOnce(&SourceState) -> R) -> R {
        f(&self.inner.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut SourceState)) {
        f(&mut self.inner.state.write().unwrap_or_else(PoisonError::into_inner));
    }
}

impl std::fmt::Debug for TraceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSource")
            .field("name", &self.inner.name)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

/// Registry of named trace sources sharing one swappable default listener.
pub struct TraceRegistry {
    sources: Mutex<HashMap<String, TraceSource>>,
    default_listener: RwLock<Arc<dyn TraceListener>>,
    default_level: Severity,
}

impl TraceRegistry {
    /// Creates a registry whose sources start at `default_level` and write
    /// to `default_listener`.
    pub fn init(default_listener: Arc<dyn TraceListener>, default_level: Severity) -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            default_listener: RwLock::new(default_listener),
            default_level,
        }
    }

    /// Returns the source registered under `name`, creating it on first use.
    pub fn source(&self, name: &str) -> TraceSource {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        sources
            .entry(name.to_string())
            .or_insert_with(|| TraceSource::new(name, self.default_level, self.default_listener()))
            .clone()
    }

    /// Returns the source registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<TraceSource> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn default_listener(&self) -> Arc<dyn TraceListener> {
        Arc::clone(
            &self
                .default_listener
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Swaps the default listener, applies it to every registered source,
    /// and returns the previous one.
    pub fn replace_default(&self, listener: Arc<dyn TraceListener>) -> Arc<dyn TraceListener> {
        let sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(
            &mut *self
                .default_listener
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            Arc::clone(&listener),
        );
        for source in sources.values() {
            source.set_listener(Arc::clone(&listener));
        }
        previous
    }

    /// Removes every source, flushes their listeners and returns them.
    pub fn teardown(&self) -> Vec<TraceSource> {
        let drained: Vec<TraceSource> = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, source)| source)
            .collect();

        for source in &drained {
            source.listener().flush();
        }
        self.default_listener().flush();
        drained
    }

    pub fn len(&self) -> usize {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
