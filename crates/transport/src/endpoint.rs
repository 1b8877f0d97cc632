//! Endpoint naming.

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Logical name shared by producers and the collector.
///
/// Must be non-empty and free of path separators so it maps onto a single
/// socket file or pipe name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointName(String);

impl EndpointName {
    pub fn new(name: impl Into<String>) -> Result<Self, TransportError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint("empty name".into()));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(TransportError::InvalidEndpoint(format!(
                "name must not contain path separators: {name}"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Socket file backing this endpoint.
    ///
    /// Lives in `$XDG_RUNTIME_DIR` when set, otherwise `/tmp`, so both sides
    /// resolve the same path and stay under the socket path length limit.
    #[cfg(unix)]
    pub fn socket_path(&self) -> PathBuf {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        dir.join(format!("{}.sock", self.0))
    }

    /// Pipe path backing this endpoint.
    #[cfg(windows)]
    pub fn pipe_path(&self) -> String {
        format!(r"\\.\pipe\{}", self.0)
    }

    /// Platform address, for logging.
    pub fn address(&self) -> String {
        #[cfg(unix)]
        {
            self.socket_path().display().to_string()
        }
        #[cfg(windows)]
        {
            self.pipe_path()
        }
    }
}

impl Default for EndpointName {
    fn default() -> Self {
        Self(pipetrace_protocol::DEFAULT_ENDPOINT_NAME.to_string())
    }
}

impl TryFrom<String> for EndpointName {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EndpointName> for String {
    fn from(value: EndpointName) -> Self {
        value.0
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
