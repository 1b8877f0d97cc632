//! Relay producer: local buffering plus the background drain task.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use pipetrace_protocol::{FrameError, MessageFrame, Severity, codec, wire};
use pipetrace_ring_buffer::RingBuffer;
use pipetrace_transport::{ClientStream, EndpointName, connect};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::ProducerError;
use crate::config::ProducerConfig;
use crate::listener::TraceListener;
use crate::sink::FallbackSink;
use crate::types::ProducerState;

/// Buffers trace events and relays them to the collector.
///
/// [`enqueue_trace`](Self::enqueue_trace) never blocks and never fails.
/// When the collector is unreachable, events accumulate in the ring buffer
/// and the oldest are overwritten once it is full.
///
/// Dropping the producer stops its drain task.
pub struct RelayProducer {
    buffer: Arc<RingBuffer<MessageFrame>>,
    state: watch::Receiver<ProducerState>,
    activity_id: Mutex<Uuid>,
    include_timestamp: bool,
    include_activity_id: bool,
    endpoint: EndpointName,
    cancel: CancellationToken,
}

/// Everything the drain task needs, moved into it at start.
struct DrainContext {
    buffer: Arc<RingBuffer<MessageFrame>>,
    endpoint: EndpointName,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    max_frame_size: usize,
    state: watch::Sender<ProducerState>,
    sink: Arc<dyn FallbackSink>,
    cancel: CancellationToken,
}

impl RelayProducer {
    /// Validates `config`, allocates the ring buffer and spawns the drain
    /// task on the current tokio runtime.
    pub fn start(config: ProducerConfig, sink: Arc<dyn FallbackSink>) -> Result<Self, ProducerError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProducerError::Runtime(e.to_string()))?;

        let buffer = Arc::new(RingBuffer::new(config.buffer_capacity)?);
        let (state_tx, state_rx) = watch::channel(ProducerState::Disconnected);
        let cancel = CancellationToken::new();

        let ctx = DrainContext {
            buffer: Arc::clone(&buffer),
            endpoint: config.endpoint.clone(),
            connect_timeout: config.connect_timeout(),
            reconnect_interval: config.reconnect_interval(),
            max_frame_size: config.max_frame_size,
            state: state_tx,
            sink,
            cancel: cancel.clone(),
        };
        runtime.spawn(drain_loop(ctx));

        debug!(
            endpoint = %config.endpoint,
            capacity = config.buffer_capacity,
            "trace relay producer started"
        );

        Ok(Self {
            buffer,
            state: state_rx,
            activity_id: Mutex::new(Uuid::new_v4()),
            include_timestamp: config.include_timestamp,
            include_activity_id: config.include_activity_id,
            endpoint: config.endpoint,
            cancel,
        })
    }

    /// Builds a frame and buffers it for delivery. Returns immediately.
    ///
    /// Calls with a blank source or message, or a source containing the
    /// `|` delimiter, are dropped, as they could never form a valid frame.
    pub fn enqueue_trace(&self, severity: Severity, source: &str, message: &str) {
        let mut frame = MessageFrame::new(severity, source, message);
        if self.include_timestamp {
            frame = frame.with_timestamp(Utc::now());
        }
        if self.include_activity_id {
            frame = frame.with_activity_id(self.activity_id());
        }
        self.enqueue_frame(frame);
    }

    /// Buffers a pre-built frame for delivery. Invalid frames are dropped.
    pub fn enqueue_frame(&self, frame: MessageFrame) {
        if !frame.is_valid() {
            debug!(source = %frame.source, "dropping invalid trace frame");
            return;
        }
        self.buffer.enqueue(frame);
    }

    /// Activity id stamped on frames when enabled.
    pub fn activity_id(&self) -> Uuid {
        *self.activity_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new activity and returns its id.
    pub fn start_activity(&self) -> Uuid {
        let id = Uuid::new_v4();
        *self.activity_id.lock().unwrap_or_else(PoisonError::into_inner) = id;
        id
    }

    pub fn state(&self) -> ProducerState {
        *self.state.borrow()
    }

    /// Subscribes to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ProducerState> {
        self.state.clone()
    }

    /// Frames buffered and not yet handed to the transport.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Frames overwritten before they could be sent.
    pub fn discarded_count(&self) -> u64 {
        self.buffer.discarded_count()
    }

    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }
}

impl TraceListener for RelayProducer {
    fn trace(&self, severity: Severity, source: &str, message: &str) {
        self.enqueue_trace(severity, source, message);
    }
}

impl Drop for RelayProducer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DrainContext {
    fn set_state(&self, state: ProducerState) {
        self.state.send_replace(state);
    }

    fn report(&self, line: &str) {
        self.sink.write_line(line);
    }
}

/// Connect, drain, and on any failure wait out the reconnect interval and
/// start over. Runs until cancelled.
async fn drain_loop(ctx: DrainContext) {
    loop {
        ctx.set_state(ProducerState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            result = connect(&ctx.endpoint, ctx.connect_timeout) => result,
        };

        match connected {
            Ok(stream) => {
                ctx.set_state(ProducerState::Connected);
                match pump(&ctx, stream).await {
                    Ok(()) => return,
                    Err(e) => ctx.report(&format!(
                        "trace relay connection to '{}' lost: {e}; reconnecting in {:?}",
                        ctx.endpoint, ctx.reconnect_interval
                    )),
                }
            }
            Err(e) => ctx.report(&format!(
                "trace relay could not connect to '{}': {e}; retrying in {:?}",
                ctx.endpoint, ctx.reconnect_interval
            )),
        }

        ctx.set_state(ProducerState::Disconnected);

        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(ctx.reconnect_interval) => {}
        }
    }
}

/// Moves frames from the buffer to the connection until the connection
/// fails (`Err`) or the producer is dropped (`Ok`).
async fn pump(ctx: &DrainContext, stream: ClientStream) -> Result<(), FrameError> {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut probe = [0u8; 1];

    loop {
        let frame = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            closed = wait_closed(&mut reader, &mut probe) => return Err(closed),
            frame = ctx.buffer.dequeue() => frame,
        };

        let body = match codec::encode(&frame, ctx.max_frame_size) {
            Ok(body) => body,
            Err(e) => {
                ctx.report(&format!(
                    "dropping trace frame from '{}': {e}",
                    frame.source
                ));
                continue;
            }
        };

        wire::write_frame(&mut writer, &body).await?;
    }
}

/// Resolves once the collector closes its end. The collector never writes,
/// so any read completion means the connection is gone.
async fn wait_closed<R: AsyncRead + Unpin>(reader: &mut R, probe: &mut [u8]) -> FrameError {
    match reader.read(probe).await {
        Ok(0) => FrameError::Protocol("collector closed the connection".into()),
        Ok(_) => FrameError::Protocol("unexpected data from collector".into()),
        Err(e) => FrameError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use pipetrace_transport::PipeListener;

    use super::*;

    fn unique_endpoint() -> EndpointName {
        EndpointName::new(format!("pipetrace-test-{}", Uuid::new_v4())).unwrap()
    }

    fn test_config(endpoint: EndpointName) -> ProducerConfig {
        ProducerConfig {
            reconnect_interval_ms: 50,
            connect_timeout_ms: 500,
            ..ProducerConfig::for_endpoint(endpoint)
        }
    }

    fn capture_sink() -> (Arc<dyn FallbackSink>, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink = move |line: &str| captured.lock().unwrap().push(line.to_string());
        let sink: Arc<dyn FallbackSink> = Arc::new(sink);
        (sink, lines)
    }

    #[tokio::test]
    async fn start_rejects_bad_capacity() {
        let config = ProducerConfig {
            buffer_capacity: 3,
            ..test_config(unique_endpoint())
        };
        let (sink, _) = capture_sink();
        assert!(matches!(
            RelayProducer::start(config, sink),
            Err(ProducerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let (sink, _) = capture_sink();
        assert!(matches!(
            RelayProducer::start(test_config(unique_endpoint()), sink),
            Err(ProducerError::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn buffers_while_disconnected_and_reports_to_sink() {
        let config = ProducerConfig {
            buffer_capacity: 4,
            ..test_config(unique_endpoint())
        };
        let (sink, lines) = capture_sink();
        let producer = RelayProducer::start(config, sink).unwrap();

        for i in 0..10 {
            producer.enqueue_trace(Severity::Information, "src", &format!("msg {i}"));
        }

        assert_eq!(producer.pending(), 4);
        assert_eq!(producer.discarded_count(), 6);

        // Give the drain task time to fail at least once.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!lines.lock().unwrap().is_empty());
        assert_ne!(producer.state(), ProducerState::Connected);
        assert_eq!(producer.pending(), 4);
    }

    #[tokio::test]
    async fn invalid_calls_are_dropped() {
        let (sink, _) = capture_sink();
        let producer = RelayProducer::start(test_config(unique_endpoint()), sink).unwrap();

        producer.enqueue_trace(Severity::Error, "", "no source");
        producer.enqueue_trace(Severity::Error, "src", "  ");
        producer.enqueue_frame(MessageFrame::new(Severity::Unspecified, "src", "msg"));

        assert_eq!(producer.pending(), 0);
    }

    #[tokio::test]
    async fn source_with_delimiter_is_dropped() {
        let (sink, _) = capture_sink();
        let producer = RelayProducer::start(test_config(unique_endpoint()), sink).unwrap();

        producer.enqueue_trace(Severity::Information, "svc|a", "hello");
        producer.enqueue_frame(MessageFrame::new(Severity::Information, "svc|a", "hello"));
        assert_eq!(producer.pending(), 0);

        producer.enqueue_trace(Severity::Information, "svc", "a|hello");
        assert_eq!(producer.pending(), 1);
    }

    #[tokio::test]
    async fn activity_rotation() {
        let (sink, _) = capture_sink();
        let producer = RelayProducer::start(test_config(unique_endpoint()), sink).unwrap();

        let before = producer.activity_id();
        let started = producer.start_activity();
        assert_ne!(before, started);
        assert_eq!(producer.activity_id(), started);
    }

    #[tokio::test]
    async fn drains_to_listening_endpoint() {
        let endpoint = unique_endpoint();
        let listener = PipeListener::bind(&endpoint, 1).unwrap();
        let pipe = listener.endpoint().unwrap();

        let config = ProducerConfig {
            include_timestamp: true,
            include_activity_id: true,
            ..test_config(endpoint)
        };
        let (sink, _) = capture_sink();
        let producer = RelayProducer::start(config, sink).unwrap();
        producer.enqueue_trace(Severity::Warning, "svc", "first");
        producer.enqueue_trace(Severity::Error, "svc", "second");

        let mut stream = pipe.accept().await.unwrap();
        let max = pipetrace_protocol::MAX_FRAME_SIZE;
        let f1 = wire::receive(&mut stream, max).await.unwrap().unwrap();
        let f2 = wire::receive(&mut stream, max).await.unwrap().unwrap();

        assert_eq!((f1.severity, f1.message.as_str()), (Severity::Warning, "first"));
        assert_eq!((f2.severity, f2.message.as_str()), (Severity::Error, "second"));
        assert!(f1.timestamp.is_some());
        assert_eq!(f1.activity_id, Some(producer.activity_id()));

        let mut state = producer.subscribe_state();
        state
            .wait_for(|s| *s == ProducerState::Connected)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_frames_reported_and_skipped() {
        let endpoint = unique_endpoint();
        let listener = PipeListener::bind(&endpoint, 1).unwrap();
        let pipe = listener.endpoint().unwrap();

        let config = ProducerConfig {
            max_frame_size: 64,
            ..test_config(endpoint)
        };
        let (sink, lines) = capture_sink();
        let producer = RelayProducer::start(config, sink).unwrap();
        producer.enqueue_trace(Severity::Information, "svc", &"x".repeat(200));
        producer.enqueue_trace(Severity::Information, "svc", "small");

        let mut stream = pipe.accept().await.unwrap();
        let frame = wire::receive(&mut stream, 64).await.unwrap().unwrap();
        assert_eq!(frame.message, "small");
        assert!(
            lines
                .lock()
                .unwrap()
                .iter()
                .any(|l| l.contains("frame too large"))
        );
    }
}
