//! Client side of the transport (producer).

use std::time::Duration;

use tracing::debug;

use crate::endpoint::EndpointName;
use crate::error::TransportError;

#[cfg(unix)]
pub type ClientStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type ClientStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Connects to the collector listening on `endpoint`.
///
/// Fails with [`TransportError::Timeout`] if no connection is established
/// within `timeout`.
pub async fn connect(
    endpoint: &EndpointName,
    timeout: Duration,
) -> Result<ClientStream, TransportError> {
    match tokio::time::timeout(timeout, open(endpoint)).await {
        Ok(Ok(stream)) => {
            debug!(endpoint = %endpoint, "connected to collector");
            Ok(stream)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(unix)]
async fn open(endpoint: &EndpointName) -> Result<ClientStream, TransportError> {
    Ok(tokio::net::UnixStream::connect(endpoint.socket_path()).await?)
}

#[cfg(windows)]
async fn open(endpoint: &EndpointName) -> Result<ClientStream, TransportError> {
    use tokio::net::windows::named_pipe::ClientOptions;
    use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;

    let path = endpoint.pipe_path();
    loop {
        match ClientOptions::new().open(&path) {
            Ok(client) => return Ok(client),
            // Every server instance is taken; wait for one to free up.
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {}
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
