use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::{MIN_CAPACITY, RingBufferError};

/// Fixed-capacity circular queue shared between producers and consumers.
///
/// Slots, cursors and counters live behind a single mutex. When the buffer
/// is full, [`enqueue`](Self::enqueue) overwrites the oldest unread item and
/// increments [`discarded_count`](Self::discarded_count). Dequeue order is
/// enqueue order among the items that were not overwritten.
#[derive(Debug)]
pub struct RingBuffer<T> {
    state: Mutex<State<T>>,
    /// Wakes blocking waiters in `try_dequeue_timeout`.
    ready: Condvar,
    /// Wakes async waiters in `dequeue`.
    notify: Notify,
    capacity: usize,
}

#[derive(Debug)]
struct State<T> {
    slots: Box<[Option<T>]>,
    mask: usize,
    write: usize,
    read: usize,
    available: usize,
    discarded: u64,
}

impl<T> State<T> {
    fn push(&mut self, item: T) {
        self.slots[self.write] = Some(item);
        self.write = (self.write + 1) & self.mask;

        if self.available == self.slots.len() {
            // The slot just written was the oldest unread one.
            self.read = (self.read + 1) & self.mask;
            self.discarded += 1;
        } else {
            self.available += 1;
        }
    }

    fn pop(&mut self) -> Option<T> {
        if self.available == 0 {
            return None;
        }
        let item = self.slots[self.read].take();
        self.read = (self.read + 1) & self.mask;
        self.available -= 1;
        item
    }
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// `capacity` must be a power of two and at least [`MIN_CAPACITY`];
    /// cursor wraparound is computed with the mask `capacity - 1`.
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity < MIN_CAPACITY {
            return Err(RingBufferError::InvalidConfiguration(format!(
                "capacity must be at least {MIN_CAPACITY}, got {capacity}"
            )));
        }
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::InvalidConfiguration(format!(
                "capacity must be a power of two, got {capacity}"
            )));
        }

        let slots = std::iter::repeat_with(|| None).take(capacity).collect();
        Ok(Self {
            state: Mutex::new(State {
                slots,
                mask: capacity - 1,
                write: 0,
                read: 0,
                available: 0,
                discarded: 0,
            }),
            ready: Condvar::new(),
            notify: Notify::new(),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item, overwriting the oldest unread item when full.
    ///
    /// Never blocks on consumers and never fails.
    pub fn enqueue(&self, item: T) {
        self.lock().push(item);
        self.ready.notify_one();
        self.notify.notify_one();
    }

    /// Removes and returns the oldest item, or `None` if the buffer is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().pop()
    }

    /// Waits up to `timeout` for an item to become available.
    ///
    /// `None` waits until an item arrives. Blocks the calling thread; async
    /// callers should use [`dequeue`](Self::dequeue) instead.
    pub fn try_dequeue_timeout(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.lock();

        while state.available == 0 {
            state = match (timeout, deadline) {
                (Some(_), Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                // No timeout, or one too large to represent as a deadline.
                _ => self
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        state.pop()
    }

    /// Waits asynchronously until an item is available and returns it.
    pub async fn dequeue(&self) -> T {
        loop {
            if let Some(item) = self.try_dequeue() {
                return item;
            }
            // `notify_one` stores a permit when nobody is waiting, so an
            // enqueue racing with the check above is not lost.
            self.notify.notified().await;
        }
    }

    /// Returns a copy of the oldest item without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let state = self.lock();
        if state.available == 0 {
            return None;
        }
        state.slots[state.read].clone()
    }

    /// Number of items available for dequeue.
    pub fn len(&self) -> usize {
        self.lock().available
    }

    /// Whether no items are available.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items overwritten before they were read.
    pub fn discarded_count(&self) -> u64 {
        self.lock().discarded
    }

    /// Drops all available items. The discard counter is left untouched.
    pub fn clear(&self) {
        let mut state = self.lock();
        while state.pop().is_some() {}
    }
}
