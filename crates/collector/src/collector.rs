//! Relay collector: endpoint pool manager and per-connection handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pipetrace_protocol::{codec, wire};
use pipetrace_transport::{EndpointName, PipeEndpoint, PipeListener};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::connections::{ConnectionInfo, ConnectionState, Connections};
use crate::messages::Messages;
use crate::{CollectorError, ENDPOINT_RETRY_DELAY};

/// Accepts producer connections on a pool of endpoints and merges their
/// frames into [`Messages`].
pub struct RelayCollector {
    endpoint: EndpointName,
    shared: Arc<Shared>,
    listener: Arc<PipeListener>,
    cancel: CancellationToken,
    manager: Option<JoinHandle<()>>,
}

/// State shared between the collector handle, the pool manager and the
/// connection handlers.
#[derive(Debug, Default)]
struct Shared {
    messages: Arc<Messages>,
    connections: Connections,
    frames_received: AtomicU64,
    invalid_frames: AtomicU64,
}

impl RelayCollector {
    /// Validates `config`, claims the endpoint name and starts the pool
    /// manager on the current tokio runtime.
    pub fn start(config: CollectorConfig) -> Result<Self, CollectorError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CollectorError::Runtime(e.to_string()))?;

        let listener = Arc::new(PipeListener::bind(
            &config.endpoint,
            config.max_server_instances,
        )?);
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();

        let manager = runtime.spawn(run_pool(
            Arc::clone(&listener),
            config.max_concurrent_connections,
            config.max_frame_size,
            Arc::clone(&shared),
            cancel.clone(),
        ));

        info!(
            endpoint = %config.endpoint,
            max_connections = config.max_concurrent_connections,
            "trace collector started"
        );

        Ok(Self {
            endpoint: config.endpoint,
            shared,
            listener,
            cancel,
            manager: Some(manager),
        })
    }

    /// Queue of collected frames.
    pub fn messages(&self) -> Arc<Messages> {
        Arc::clone(&self.shared.messages)
    }

    /// Shorthand for `messages().try_dequeue()`.
    pub fn try_dequeue(&self) -> Option<crate::MessageFrame> {
        self.shared.messages.try_dequeue()
    }

    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    /// Endpoints waiting for a producer.
    pub fn listening(&self) -> usize {
        self.shared.connections.count(ConnectionState::Listening)
    }

    /// Endpoints currently serving a producer.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.count(ConnectionState::Connected)
    }

    /// Snapshot of every pooled endpoint.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.shared.connections.snapshot()
    }

    /// Valid frames received since start.
    pub fn frames_received(&self) -> u64 {
        self.shared.frames_received.load(Ordering::Relaxed)
    }

    /// Frames that decoded as invalid and were discarded.
    pub fn invalid_frames(&self) -> u64 {
        self.shared.invalid_frames.load(Ordering::Relaxed)
    }

    /// Stops accepting and closes every endpoint. Frames already queued stay
    /// in [`Messages`].
    ///
    /// Handlers stop at once, abandoning a partially read frame. Its
    /// connection is being closed anyway, so nothing that could have been
    /// queued is lost.
    pub async fn dispose(mut self) {
        self.cancel.cancel();
        if let Some(manager) = self.manager.take()
            && let Err(e) = manager.await
        {
            warn!("collector pool manager failed: {e}");
        }
        info!(endpoint = %self.endpoint, "trace collector disposed");
    }
}

impl Drop for RelayCollector {
    /// Frees the endpoint name immediately; connection handlers wind down in
    /// the background.
    fn drop(&mut self) {
        self.cancel.cancel();
        self.listener.release_name();
    }
}

/// Keeps `max_connections` endpoints listening, replacing each one whose
/// handler exits, until cancelled.
async fn run_pool(
    listener: Arc<PipeListener>,
    max_connections: usize,
    max_frame_size: usize,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut handlers = JoinSet::new();
    let mut next_id: u64 = 0;

    loop {
        let mut open_failed = false;
        while handlers.len() < max_connections {
            match listener.endpoint() {
                Ok(endpoint) => {
                    next_id += 1;
                    shared.connections.insert_listening(next_id);
                    handlers.spawn(serve_endpoint(
                        next_id,
                        endpoint,
                        max_frame_size,
                        Arc::clone(&shared),
                        cancel.clone(),
                    ));
                }
                Err(e) => {
                    warn!(endpoint = %listener.endpoint_name(), error = %e, "failed to open endpoint");
                    open_failed = true;
                    break;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(joined) = handlers.join_next() => {
                if let Err(e) = joined {
                    warn!("connection handler failed: {e}");
                }
            }
            _ = tokio::time::sleep(ENDPOINT_RETRY_DELAY), if open_failed => {}
        }
    }

    // Handlers observe the same token and exit on their own.
    while handlers.join_next().await.is_some() {}
}

/// Serves one endpoint: waits for a producer, then queues its frames until
/// it disconnects, fails, or the collector is disposed.
async fn serve_endpoint(
    id: u64,
    endpoint: PipeEndpoint,
    max_frame_size: usize,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let accepted = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = endpoint.accept() => Some(result),
    };

    let mut stream = match accepted {
        Some(Ok(stream)) => stream,
        Some(Err(e)) => {
            warn!(connection = id, error = %e, "accept failed");
            shared.connections.remove(id);
            return;
        }
        None => {
            shared.connections.remove(id);
            return;
        }
    };

    shared.connections.mark_connected(id);
    debug!(connection = id, "producer connected");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = wire::read_frame(&mut stream, max_frame_size) => result,
        };

        match next {
            Ok(Some(body)) => {
                let frame = codec::decode(&body);
                if frame.is_valid() {
                    shared.connections.record_frame(id);
                    shared.frames_received.fetch_add(1, Ordering::Relaxed);
                    shared.messages.push(frame);
                } else {
                    shared.invalid_frames.fetch_add(1, Ordering::Relaxed);
                    debug!(connection = id, "discarding invalid frame");
                }
            }
            Ok(None) => {
                debug!(connection = id, "producer disconnected");
                break;
            }
            Err(e) => {
                warn!(connection = id, error = %e, "dropping producer connection");
                break;
            }
        }
    }

    if let Some(info) = shared.connections.remove(id) {
        debug!(connection = id, frames = info.frames, "endpoint closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipetrace_protocol::{MAX_FRAME_SIZE, MessageFrame, Severity};
    use pipetrace_transport::connect;

    use super::*;

    fn unique_endpoint() -> EndpointName {
        EndpointName::new(format!("pipetrace-test-{}", uuid::Uuid::new_v4())).unwrap()
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn start_rejects_zero_connections() {
        let result = RelayCollector::start(CollectorConfig::new(unique_endpoint(), 0));
        assert!(matches!(
            result,
            Err(CollectorError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let result = RelayCollector::start(CollectorConfig::new(unique_endpoint(), 1));
        assert!(matches!(result, Err(CollectorError::Runtime(_))));
    }

    #[tokio::test]
    async fn pool_fills_to_limit() {
        let collector = RelayCollector::start(CollectorConfig::new(unique_endpoint(), 3)).unwrap();
        wait_until(|| collector.listening() == 3).await;
        assert_eq!(collector.active_connections(), 0);
        collector.dispose().await;
    }

    #[tokio::test]
    async fn second_collector_on_same_name_fails() {
        let endpoint = unique_endpoint();
        let first = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 1)).unwrap();

        let second = RelayCollector::start(CollectorConfig::new(endpoint, 1));
        assert!(matches!(second, Err(CollectorError::Transport(_))));

        first.dispose().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_right_after_drop() {
        let endpoint = unique_endpoint();
        let first = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 2)).unwrap();
        wait_until(|| first.listening() == 2).await;
        drop(first);

        let second = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 2)).unwrap();

        let mut client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wire::send(
            &mut client,
            &MessageFrame::new(Severity::Information, "svc", "after restart"),
            MAX_FRAME_SIZE,
        )
        .await
        .unwrap();
        wait_until(|| second.frames_received() == 1).await;
        assert_eq!(second.try_dequeue().unwrap().message, "after restart");

        second.dispose().await;
    }

    #[tokio::test]
    async fn queues_valid_frames_and_counts_invalid() {
        let endpoint = unique_endpoint();
        let collector = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 2)).unwrap();

        let mut client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wire::send(
            &mut client,
            &MessageFrame::new(Severity::Error, "svc", "kept"),
            MAX_FRAME_SIZE,
        )
        .await
        .unwrap();
        wire::write_frame(&mut client, b"\0Bogus|svc|dropped").await.unwrap();

        wait_until(|| collector.frames_received() == 1 && collector.invalid_frames() == 1).await;

        let frame = collector.try_dequeue().unwrap();
        assert_eq!(frame.message, "kept");
        assert!(collector.try_dequeue().is_none());

        collector.dispose().await;
    }

    #[tokio::test]
    async fn pool_replenishes_after_disconnect() {
        let endpoint = unique_endpoint();
        let collector = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 1)).unwrap();
        wait_until(|| collector.listening() == 1).await;

        let client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wait_until(|| collector.active_connections() == 1).await;
        assert_eq!(collector.listening(), 0);

        drop(client);
        wait_until(|| collector.active_connections() == 0 && collector.listening() == 1).await;

        // The replacement endpoint serves a new producer.
        let mut client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wire::send(
            &mut client,
            &MessageFrame::new(Severity::Information, "svc", "again"),
            MAX_FRAME_SIZE,
        )
        .await
        .unwrap();
        wait_until(|| collector.frames_received() == 1).await;

        let ids: Vec<u64> = collector.connections().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2]);

        collector.dispose().await;
    }

    #[tokio::test]
    async fn oversized_frame_drops_connection() {
        let endpoint = unique_endpoint();
        let config = CollectorConfig {
            max_frame_size: 32,
            ..CollectorConfig::new(endpoint.clone(), 1)
        };
        let collector = RelayCollector::start(config).unwrap();

        let mut client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wire::write_frame(&mut client, &[b'x'; 64]).await.unwrap();

        wait_until(|| {
            collector
                .connections()
                .iter()
                .all(|c| c.state == ConnectionState::Listening && c.id == 2)
                && collector.listening() == 1
        })
        .await;
        assert!(collector.try_dequeue().is_none());

        collector.dispose().await;
    }

    #[tokio::test]
    async fn dispose_closes_active_connections() {
        let endpoint = unique_endpoint();
        let collector = RelayCollector::start(CollectorConfig::new(endpoint.clone(), 1)).unwrap();
        let mut client = connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        wait_until(|| collector.active_connections() == 1).await;

        collector.dispose().await;

        // The server side is gone: reads see EOF or an error.
        let mut buf = [0u8; 1];
        let read = tokio::io::AsyncReadExt::read(&mut client, &mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
