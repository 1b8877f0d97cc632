use crossbeam_queue::SegQueue;
use pipetrace_protocol::MessageFrame;

/// Unbounded multi-producer multi-consumer queue of collected frames.
///
/// FIFO holds per connection only: frames pushed by different connection
/// handlers interleave in arrival order.
#[derive(Debug, Default)]
pub struct Messages {
    queue: SegQueue<MessageFrame>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, frame: MessageFrame) {
        self.queue.push(frame);
    }

    /// Returns the next collected frame, or `None` when the queue is empty.
    /// Never blocks.
    pub fn try_dequeue(&self) -> Option<MessageFrame> {
        self.queue.pop()
    }

    /// Removes every frame currently queued.
    pub fn drain(&self) -> Vec<MessageFrame> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
