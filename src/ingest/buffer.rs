//! buffer.rs
//! Bounded frame queue between asynchronous ingestion and the output loop.
//! - Lock-free `ArrayQueue`; `push` never blocks the caller.
//! - Overload policy: drop-oldest. The newest frame always gets in.
//! - Every push is counted as processed; an eviction is additionally counted as dropped.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::ingest::frame::Frame;
use crate::utils::metrics::PerformanceMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Enqueued,
    /// The oldest queued frame was discarded to make room.
    EnqueuedWithEviction,
}

pub struct FrameBuffer {
    queue: ArrayQueue<Frame>,
    monitor: Arc<PerformanceMonitor>,
}

impl FrameBuffer {
    /// `capacity` must be at least 1 (validated by the config layer).
    pub fn new(capacity: usize, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            monitor,
        }
    }

    pub fn push(&self, frame: Frame) -> PushResult {
        // force_push hands back the evicted head when the ring is full
        let evicted = self.queue.force_push(frame).is_some();
        self.monitor.record_push(evicted);
        if evicted {
            PushResult::EnqueuedWithEviction
        } else {
            PushResult::Enqueued
        }
    }

    /// Oldest queued frame, if any.
    pub fn pop(&self) -> Option<Frame> {
        self.queue.pop()
    }

    /// Discards everything queued; returns how many frames were removed.
    /// Not counted as drops: used for test-pattern preemption and shutdown.
    pub fn clear(&self) -> usize {
        let mut n = 0;
        while self.queue.pop().is_some() {
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity: usize) -> (FrameBuffer, Arc<PerformanceMonitor>) {
        let monitor = Arc::new(PerformanceMonitor::new());
        (FrameBuffer::new(capacity, monitor.clone()), monitor)
    }

    fn tagged(tag: u8) -> Frame {
        Frame::normalize(&[tag], 4)
    }

    #[test]
    fn fifo_order_below_capacity() {
        let (buf, _) = buffer(4);
        for t in 1..=3 {
            assert_eq!(buf.push(tagged(t)), PushResult::Enqueued);
        }
        let order: Vec<u8> = std::iter::from_fn(|| buf.pop()).map(|f| f.as_slice()[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(buf.pop().is_none());
    }

    #[test]
    fn full_buffer_evicts_oldest() {
        let (buf, monitor) = buffer(3);
        for t in 1..=3 {
            buf.push(tagged(t));
        }
        assert_eq!(buf.push(tagged(4)), PushResult::EnqueuedWithEviction);
        assert_eq!(buf.push(tagged(5)), PushResult::EnqueuedWithEviction);

        let order: Vec<u8> = std::iter::from_fn(|| buf.pop()).map(|f| f.as_slice()[0]).collect();
        assert_eq!(order, vec![3, 4, 5]);
        assert_eq!(monitor.processed(), 5);
        assert_eq!(monitor.dropped(), 2);
    }

    #[test]
    fn counters_grow_monotonically_under_overload() {
        let (buf, monitor) = buffer(2);
        let mut last_dropped = 0;
        for i in 0..50u64 {
            buf.push(tagged(i as u8));
            assert_eq!(monitor.processed(), i + 1);
            assert!(monitor.dropped() >= last_dropped);
            last_dropped = monitor.dropped();
        }
        assert_eq!(monitor.dropped(), 48);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn capacity_one_keeps_only_latest() {
        let (buf, _) = buffer(1);
        buf.push(tagged(1));
        assert_eq!(buf.push(tagged(2)), PushResult::EnqueuedWithEviction);
        assert_eq!(buf.pop().map(|f| f.as_slice()[0]), Some(2));
    }

    #[test]
    fn clear_is_not_a_drop() {
        let (buf, monitor) = buffer(8);
        for t in 0..5 {
            buf.push(tagged(t));
        }
        assert_eq!(buf.clear(), 5);
        assert!(buf.is_empty());
        assert_eq!(monitor.dropped(), 0);
    }
}
