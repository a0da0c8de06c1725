// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded buffer queues.
//!
//! Each consumer is connected to the producer by two queues: `output`
//! carries filled buffers to the consumer and `ret` carries emptied buffers
//! back. The pool of buffers circulating between the two is allocated once,
//! so a full queue is the backpressure signal and an empty return queue
//! means the consumer is lagging.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::buffer::SampleBuffer;

/// Bounded FIFO of [`SampleBuffer`]s with non-blocking offer/poll.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct BufferQueue {
    tx: Sender<SampleBuffer>,
    rx: Receiver<SampleBuffer>,
    capacity: usize,
}

impl BufferQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Enqueue without blocking. A full queue hands the buffer back.
    pub fn offer(&self, buf: SampleBuffer) -> Result<(), SampleBuffer> {
        self.tx.try_send(buf).map_err(|e| e.into_inner())
    }

    /// Dequeue without blocking.
    pub fn poll(&self) -> Option<SampleBuffer> {
        self.rx.try_recv().ok()
    }

    /// Dequeue, waiting at most `timeout`. `None` means no data yet.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<SampleBuffer> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Move every queued buffer into `other` until either side runs out.
    /// Returns the number of buffers moved.
    pub fn drain_into(&self, other: &BufferQueue) -> usize {
        let mut moved = 0;
        while let Some(buf) = self.poll() {
            if let Err(buf) = other.offer(buf) {
                // `other` is full; put the buffer back where it came from.
                let _ = self.offer(buf);
                break;
            }
            moved += 1;
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The delivery queue and the return queue of one consumer.
#[derive(Debug, Clone)]
pub struct QueuePair {
    /// Filled buffers travelling to the consumer.
    pub output: BufferQueue,
    /// Emptied buffers travelling back to the producer.
    pub ret: BufferQueue,
}

impl QueuePair {
    /// Create both queues with `depth` slots and pre-fill the return queue
    /// with `depth` buffers of `buffer_capacity` samples each.
    pub fn with_buffers(depth: usize, buffer_capacity: usize) -> Self {
        let output = BufferQueue::bounded(depth);
        let ret = BufferQueue::bounded(depth);
        for _ in 0..depth {
            // Cannot fail: the queue has exactly `depth` free slots.
            let _ = ret.offer(SampleBuffer::new(buffer_capacity));
        }
        Self { output, ret }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_returns_buffer_when_full() {
        let q = BufferQueue::bounded(1);
        assert!(q.offer(SampleBuffer::new(4)).is_ok());
        let rejected = q.offer(SampleBuffer::new(8));
        match rejected {
            Err(buf) => assert_eq!(buf.capacity(), 8),
            Ok(()) => panic!("offer into a full queue must fail"),
        }
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn poll_on_empty_queue_does_not_block() {
        let q = BufferQueue::bounded(2);
        assert!(q.poll().is_none());
        assert!(q.poll_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn queue_preserves_order() {
        let q = BufferQueue::bounded(3);
        for cap in [1, 2, 3] {
            q.offer(SampleBuffer::new(cap)).unwrap();
        }
        let caps: Vec<_> = std::iter::from_fn(|| q.poll())
            .map(|b| b.capacity())
            .collect();
        assert_eq!(caps, vec![1, 2, 3]);
    }

    #[test]
    fn pair_prefills_return_queue() {
        let pair = QueuePair::with_buffers(20, 1024);
        assert_eq!(pair.ret.len(), 20);
        assert!(pair.output.is_empty());
        let buf = pair.ret.poll().unwrap();
        assert_eq!(buf.capacity(), 1024);
    }

    #[test]
    fn drain_into_moves_backlog() {
        let pair = QueuePair::with_buffers(4, 8);
        while let Some(buf) = pair.ret.poll() {
            pair.output.offer(buf).unwrap();
        }
        assert_eq!(pair.output.drain_into(&pair.ret), 4);
        assert!(pair.output.is_empty());
        assert_eq!(pair.ret.len(), 4);
    }

    #[test]
    fn clones_share_the_queue() {
        let q = BufferQueue::bounded(2);
        let other = q.clone();
        q.offer(SampleBuffer::new(1)).unwrap();
        assert_eq!(other.len(), 1);
        assert!(other.poll().is_some());
        assert!(q.is_empty());
    }
}
