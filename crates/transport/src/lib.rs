//! Local-machine IPC transport for the trace relay.
//!
//! Producers connect as clients to a named endpoint; the collector owns the
//! server side. On Unix the endpoint is a domain socket, on Windows a named
//! pipe. A [`PipeEndpoint`] serves exactly one client, mirroring the
//! one-client-per-handle model of named pipes.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod server;

pub use client::{ClientStream, connect};
pub use endpoint::EndpointName;
pub use error::TransportError;
pub use server::{PipeEndpoint, PipeListener, ServerStream};

use std::time::Duration;

/// Timeout for a single client connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on concurrent server instances for one endpoint name
/// (the Windows named-pipe limit).
pub const MAX_SERVER_INSTANCES: usize = 254;
