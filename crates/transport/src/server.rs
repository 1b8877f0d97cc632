//! Server side of the transport (collector).
//!
//! A [`PipeListener`] owns the endpoint name. Each call to
//! [`PipeListener::endpoint`] opens one more listening instance, which
//! accepts a single client and is then consumed.

#[cfg(unix)]
use std::sync::Arc;

use tracing::info;

use crate::MAX_SERVER_INSTANCES;
use crate::endpoint::EndpointName;
use crate::error::TransportError;

#[cfg(unix)]
pub type ServerStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type ServerStream = tokio::net::windows::named_pipe::NamedPipeServer;

/// Server-side owner of an endpoint name.
#[derive(Debug)]
pub struct PipeListener {
    endpoint: EndpointName,
    max_instances: usize,
    #[cfg(unix)]
    listener: Arc<tokio::net::UnixListener>,
    /// Device and inode of the socket file we created, so drop only removes
    /// our own file.
    #[cfg(unix)]
    socket_id: Option<(u64, u64)>,
    #[cfg(windows)]
    first: std::sync::Mutex<Option<tokio::net::windows::named_pipe::NamedPipeServer>>,
}

impl PipeListener {
    /// Claims `endpoint` for a server allowing up to `max_instances`
    /// concurrently listening instances.
    ///
    /// Fails with [`TransportError::AddrInUse`] when another live server
    /// already owns the name. Must be called within a tokio runtime.
    pub fn bind(endpoint: &EndpointName, max_instances: usize) -> Result<Self, TransportError> {
        if max_instances == 0 || max_instances > MAX_SERVER_INSTANCES {
            return Err(TransportError::InvalidConfiguration(format!(
                "max_instances must be in 1..={MAX_SERVER_INSTANCES}, got {max_instances}"
            )));
        }

        let listener = Self::bind_platform(endpoint, max_instances)?;
        info!(endpoint = %endpoint, address = %endpoint.address(), "trace endpoint bound");
        Ok(listener)
    }

    #[cfg(unix)]
    fn bind_platform(endpoint: &EndpointName, max_instances: usize) -> Result<Self, TransportError> {
        use std::os::unix::fs::MetadataExt;

        let path = endpoint.socket_path();
        if path.exists() {
            // A socket file nobody answers on is left over from a dead server.
            // A live server sees this check as a client that connects and
            // closes without sending a frame.
            if std::os::unix::net::UnixStream::connect(&path).is_ok() {
                return Err(TransportError::AddrInUse(endpoint.to_string()));
            }
            std::fs::remove_file(&path)?;
        }

        let listener = tokio::net::UnixListener::bind(&path)?;
        let socket_id = std::fs::metadata(&path).ok().map(|m| (m.dev(), m.ino()));

        Ok(Self {
            endpoint: endpoint.clone(),
            max_instances,
            listener: Arc::new(listener),
            socket_id,
        })
    }

    #[cfg(windows)]
    fn bind_platform(endpoint: &EndpointName, max_instances: usize) -> Result<Self, TransportError> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let first = ServerOptions::new()
            .first_pipe_instance(true)
            .max_instances(max_instances)
            .create(endpoint.pipe_path())
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    TransportError::AddrInUse(endpoint.to_string())
                } else {
                    TransportError::Io(e)
                }
            })?;

        Ok(Self {
            endpoint: endpoint.clone(),
            max_instances,
            first: std::sync::Mutex::new(Some(first)),
        })
    }

    pub fn endpoint_name(&self) -> &EndpointName {
        &self.endpoint
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Opens one listening instance.
    #[cfg(unix)]
    pub fn endpoint(&self) -> Result<PipeEndpoint, TransportError> {
        Ok(PipeEndpoint {
            listener: Arc::clone(&self.listener),
        })
    }

    /// Opens one listening instance.
    #[cfg(windows)]
    pub fn endpoint(&self) -> Result<PipeEndpoint, TransportError> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let first = self
            .first
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let server = match first {
            Some(server) => server,
            None => ServerOptions::new()
                .max_instances(self.max_instances)
                .create(self.endpoint.pipe_path())?,
        };
        Ok(PipeEndpoint { server })
    }
}

impl PipeListener {
    /// Gives up the endpoint name so a new listener can bind it at once.
    ///
    /// On Unix this removes the socket file if it is still ours; clients
    /// already connected and pending accepts are unaffected. On Windows the
    /// name is freed when the last pipe instance closes, so this is a no-op.
    pub fn release_name(&self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            let path = self.endpoint.socket_path();
            let current = std::fs::metadata(&path).ok().map(|m| (m.dev(), m.ino()));
            if current.is_some() && current == self.socket_id {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        self.release_name();
    }
}

/// One listening server instance. Serves exactly one client.
#[derive(Debug)]
pub struct PipeEndpoint {
    #[cfg(unix)]
    listener: Arc<tokio::net::UnixListener>,
    #[cfg(windows)]
    server: tokio::net::windows::named_pipe::NamedPipeServer,
}

impl PipeEndpoint {
    /// Waits for a client and returns the connected stream.
    pub async fn accept(self) -> Result<ServerStream, TransportError> {
        #[cfg(unix)]
        {
            let (stream, _) = self.listener.accept().await?;
            Ok(stream)
        }
        #[cfg(windows)]
        {
            self.server.connect().await?;
            Ok(self.server)
        }
    }
}
