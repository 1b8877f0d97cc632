//! Registry of the collector's endpoints and their connection state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// State of one pooled endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a producer to connect.
    Listening,
    /// Serving a connected producer.
    Connected,
}

/// Snapshot of one pooled endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub state: ConnectionState,
    pub connected_at: Option<DateTime<Utc>>,
    /// Valid frames received on this connection.
    pub frames: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Connections {
    inner: Mutex<HashMap<u64, ConnectionInfo>>,
}

impl Connections {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, ConnectionInfo>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert_listening(&self, id: u64) {
        self.lock().insert(
            id,
            ConnectionInfo {
                id,
                state: ConnectionState::Listening,
                connected_at: None,
                frames: 0,
            },
        );
    }

    pub(crate) fn mark_connected(&self, id: u64) {
        if let Some(info) = self.lock().get_mut(&id) {
            info.state = ConnectionState::Connected;
            info.connected_at = Some(Utc::now());
        }
    }

    pub(crate) fn record_frame(&self, id: u64) {
        if let Some(info) = self.lock().get_mut(&id) {
            info.frames += 1;
        }
    }

    pub(crate) fn remove(&self, id: u64) -> Option<ConnectionInfo> {
        self.lock().remove(&id)
    }

    pub(crate) fn count(&self, state: ConnectionState) -> usize {
        self.lock().values().filter(|c| c.state == state).count()
    }

    /// All endpoints ordered by id.
    pub(crate) fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<ConnectionInfo> = self.lock().values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }
}
