//! pipeline.rs
//! Shared state between the ingestion path and the output loop.
//!
//! Ingestion (`ingest`) and output (`next_frame` / `mark_sent`) only meet here:
//! - FrameBuffer: lock-free bounded queue, drop-oldest on overflow.
//! - ActivityTracker + LastKnownFrame: one critical section, so the activity flag is
//!   always "LastKnownFrame has a nonzero channel".
//! - LastKnownFrame: replayed by the output loop whenever the queue is empty.
//!
//! Each operation is its own short critical section; none of them waits on the other side.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::ingest::{
    activity::{ActivityEvent, ActivityTracker},
    buffer::{FrameBuffer, PushResult},
    frame::{Frame, MAX_CHANNELS},
};
use crate::utils::metrics::PerformanceMonitor;

/// Result of one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub push: PushResult,
    pub activity: Option<ActivityEvent>,
}

/// Where the output loop got its frame from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Popped from the queue.
    Fresh,
    /// Queue was empty; last known frame replayed.
    Repeat,
}

/// A frame handed to the output loop for one tick.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub frame: Frame,
    pub origin: FrameOrigin,
    /// Ingest sequence number when this was the newest frame at pop time.
    newest_at: Option<u64>,
}

struct FrameState {
    activity: ActivityTracker,
    last_known: Option<Frame>,
    /// Frames ingested so far.
    seq: u64,
}

pub struct Pipeline {
    channels: usize,
    buffer: FrameBuffer,
    state: Mutex<FrameState>,
    monitor: Arc<PerformanceMonitor>,
}

impl Pipeline {
    /// `channels` must be 1..=512, the range the downstream firmware accepts.
    pub fn new(channels: usize, capacity: usize, monitor: Arc<PerformanceMonitor>) -> Result<Self> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(BridgeError::Config(format!(
                "channel count must be 1..={}, got {}",
                MAX_CHANNELS, channels
            )));
        }
        Ok(Self {
            channels,
            buffer: FrameBuffer::new(capacity, monitor.clone()),
            state: Mutex::new(FrameState {
                activity: ActivityTracker::new(),
                last_known: None,
                seq: 0,
            }),
            monitor,
        })
    }

    // ========================================================================
    // Ingestion side: called by the upstream decoder, once per packet
    // ========================================================================

    /// Normalizes `values` to the pipeline width, updates activity and the last
    /// known frame, then enqueues. Never blocks on the output loop.
    pub fn ingest(&self, values: &[u8]) -> IngestOutcome {
        self.ingest_frame(Frame::normalize(values, self.channels))
    }

    pub fn ingest_frame(&self, frame: Frame) -> IngestOutcome {
        let frame = if frame.len() == self.channels {
            frame
        } else {
            Frame::normalize(frame.as_slice(), self.channels)
        };

        let (push, activity) = {
            let mut st = self.state.lock();
            let activity = st.activity.observe(&frame);
            st.last_known = Some(frame.clone());
            st.seq += 1;
            // pushed under the same lock so queue order matches `seq`
            (self.buffer.push(frame), activity)
        };

        match activity {
            Some(ActivityEvent::Activated) => info!("DMX ACTIVE"),
            Some(ActivityEvent::Deactivated) => info!("DMX INACTIVE"),
            None => {}
        }

        IngestOutcome { push, activity }
    }

    /// Preempts whatever is queued with `frame`, enqueued up to `repeats` times
    /// (bounded by capacity so the injection itself never evicts).
    pub fn inject(&self, frame: Frame, repeats: usize) -> usize {
        self.buffer.clear();
        let n = repeats.min(self.buffer.capacity()).max(1);
        for _ in 0..n {
            self.ingest_frame(frame.clone());
        }
        n
    }

    // ========================================================================
    // Output side: called by the scheduler on every tick
    // ========================================================================

    /// Oldest queued frame, or a replay of the last known one. `None` only before
    /// anything has ever been ingested.
    pub fn next_frame(&self) -> Option<Outgoing> {
        let st = self.state.lock();
        if let Some(frame) = self.buffer.pop() {
            let newest_at = self.buffer.is_empty().then_some(st.seq);
            return Some(Outgoing {
                frame,
                origin: FrameOrigin::Fresh,
                newest_at,
            });
        }
        st.last_known.clone().map(|frame| Outgoing {
            frame,
            origin: FrameOrigin::Repeat,
            newest_at: None,
        })
    }

    /// Records a handled fresh frame as the last known one, unless something newer
    /// was ingested after it. LastKnownFrame never moves backwards.
    pub fn mark_sent(&self, out: &Outgoing) {
        let mut st = self.state.lock();
        if out.origin == FrameOrigin::Fresh && out.newest_at == Some(st.seq) {
            st.last_known = Some(out.frame.clone());
        }
    }

    /// Empties the queue (shutdown). The last known frame stays for diagnostics.
    pub fn drain(&self) -> usize {
        self.buffer.clear()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn queued(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().activity.is_active()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.state.lock().last_known.clone()
    }

    /// Activity flag and last known frame read together.
    pub fn activity_view(&self) -> (bool, Option<Frame>) {
        let st = self.state.lock();
        (st.activity.is_active(), st.last_known.clone())
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(channels: usize, capacity: usize) -> Pipeline {
        Pipeline::new(channels, capacity, Arc::new(PerformanceMonitor::new())).unwrap()
    }

    #[test]
    fn nothing_to_send_before_first_frame() {
        assert!(pipeline(512, 4).next_frame().is_none());
    }

    #[test]
    fn ingest_normalizes_and_queues() {
        let p = pipeline(8, 4);
        let out = p.ingest(&[1, 2, 3]);
        assert_eq!(out.push, PushResult::Enqueued);
        assert_eq!(out.activity, Some(ActivityEvent::Activated));

        let out = p.next_frame().unwrap();
        assert_eq!(out.origin, FrameOrigin::Fresh);
        assert_eq!(out.frame.as_slice(), &[1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn empty_queue_replays_last_known() {
        let p = pipeline(4, 4);
        p.ingest(&[9, 9]);
        let sent = p.next_frame().unwrap();
        p.mark_sent(&sent);

        for _ in 0..5 {
            let out = p.next_frame().unwrap();
            assert_eq!(out.origin, FrameOrigin::Repeat);
            assert_eq!(out.frame, sent.frame);
        }
    }

    #[test]
    fn activity_is_observed_at_ingestion_only() {
        let p = pipeline(4, 4);
        p.ingest(&[1]);
        let events: Vec<_> = (0..4).filter_map(|_| p.ingest(&[0]).activity).collect();
        assert_eq!(events, vec![ActivityEvent::Deactivated]);

        // Replays never touch the tracker.
        for _ in 0..10 {
            let _ = p.next_frame();
        }
        assert!(!p.is_active());
    }

    #[test]
    fn inject_preempts_queue() {
        let p = pipeline(4, 3);
        p.ingest(&[1]);
        p.ingest(&[2]);
        let n = p.inject(Frame::filled(4, 255), 5);
        assert_eq!(n, 3);
        for _ in 0..3 {
            assert_eq!(p.next_frame().unwrap().frame.as_slice(), &[255; 4]);
        }
        assert_eq!(p.monitor().dropped(), 0);
    }

    #[test]
    fn drain_keeps_last_known() {
        let p = pipeline(4, 4);
        p.ingest(&[5]);
        p.ingest(&[6]);
        assert_eq!(p.drain(), 2);
        assert_eq!(p.queued(), 0);
        assert_eq!(p.last_frame().unwrap().as_slice(), &[6, 0, 0, 0]);
    }

    #[test]
    fn sending_an_older_frame_never_rewinds_last_known() {
        let p = pipeline(4, 4);
        p.ingest(&[200]);
        p.ingest(&[0]);

        // FIFO hands out the older, lit frame first
        let older = p.next_frame().unwrap();
        assert_eq!(older.frame.channel(0), Some(200));
        p.mark_sent(&older);
        p.drain();

        let (active, last) = p.activity_view();
        assert!(!active);
        assert!(!last.unwrap().has_data());
    }

    #[test]
    fn mark_sent_skips_frames_overtaken_after_pop() {
        let p = pipeline(4, 4);
        p.ingest(&[1]);
        let out = p.next_frame().unwrap();
        p.ingest(&[0]);
        p.mark_sent(&out);
        assert_eq!(p.last_frame().unwrap().as_slice(), &[0, 0, 0, 0]);
        assert!(!p.is_active());
    }

    #[test]
    fn concurrent_ingest_keeps_activity_consistent() {
        let p = Arc::new(pipeline(4, 8));
        let writers: Vec<_> = [[0u8], [9u8]]
            .into_iter()
            .map(|v| {
                let p = p.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        p.ingest(&v);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let (active, last) = p.activity_view();
        assert_eq!(active, last.unwrap().has_data());
    }

    #[test]
    fn channel_count_is_validated() {
        let monitor = Arc::new(PerformanceMonitor::new());
        assert!(matches!(Pipeline::new(0, 4, monitor.clone()), Err(BridgeError::Config(_))));
        assert!(matches!(Pipeline::new(513, 4, monitor.clone()), Err(BridgeError::Config(_))));
        assert!(Pipeline::new(512, 4, monitor).is_ok());
    }
}
