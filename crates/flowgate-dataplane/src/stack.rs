//! Residual-path hand-off queue
//!
//! Frames not claimed by any flow are handed to an external protocol
//! stack. Only the hand-off contract lives here: a bounded FIFO of
//! copied frames with a drop-newest overflow policy. Enqueue never
//! blocks; buffers come from a free list so the steady state does not
//! allocate.

use crate::STACK_BUFFER_SIZE;
use std::collections::VecDeque;

/// Bounded FIFO toward the protocol-stack collaborator
#[derive(Debug)]
pub struct StackQueue {
    queue: VecDeque<Vec<u8>>,
    free: Vec<Vec<u8>>,
    capacity: usize,
    dropped: u64,
}

impl StackQueue {
    /// Queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Copy a frame into the queue
    ///
    /// Non-blocking. When the queue is full the newest frame is the
    /// one dropped; returns whether the frame was queued.
    #[inline]
    pub fn enqueue(&mut self, frame: &[u8]) -> bool {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            tracing::trace!(len = frame.len(), "stack queue full, dropping frame");
            return false;
        }
        let mut buf = self
            .free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(STACK_BUFFER_SIZE));
        buf.clear();
        buf.extend_from_slice(frame);
        self.queue.push_back(buf);
        true
    }

    /// Take the oldest queued frame
    ///
    /// The collaborator should hand the buffer back via
    /// [`StackQueue::recycle`] once done.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// Return a drained buffer to the free list
    pub fn recycle(&mut self, buf: Vec<u8>) {
        if self.free.len() < self.capacity {
            self.free.push(buf);
        }
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
