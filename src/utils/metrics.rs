
//! Performance counters for the frame pipeline.
//!
//! - **Ingestion counters:** processed / dropped, bumped by the frame buffer on every push.
//! - **Output counters:** sent / repeated / skipped / send_errors / resyncs, bumped by the scheduler.
//! - **Rate:** output frames per second over a rolling 1 s window, recomputed on `sample()`.
//!
//! Counters are atomics so neither the ingestion path nor the output thread ever waits on
//! the other. Only the rate window sits behind a (short) lock.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::Serialize;

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Snapshot of pipeline performance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    /// Output frames per second (last completed window).
    pub rate: f64,
    pub processed: u64,
    pub dropped: u64,
    pub drop_rate_pct: f64,
    pub sent: u64,
    pub repeated: u64,
    pub skipped: u64,
    pub send_errors: u64,
    pub resyncs: u64,
}

/// `dropped / (dropped + processed) * 100`, zero when nothing was pushed.
pub fn drop_rate_pct(dropped: u64, processed: u64) -> f64 {
    let total = dropped + processed;
    if total == 0 {
        0.0
    } else {
        dropped as f64 / total as f64 * 100.0
    }
}

struct RateWindow {
    start: Instant,
    handed_at_start: u64,
    rate: f64,
}

pub struct PerformanceMonitor {
    processed: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    repeated: AtomicU64,
    skipped: AtomicU64,
    send_errors: AtomicU64,
    resyncs: AtomicU64,
    frozen: AtomicBool,
    window: Mutex<RateWindow>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            repeated: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            frozen: AtomicBool::new(false),
            window: Mutex::new(RateWindow {
                start: Instant::now(),
                handed_at_start: 0,
                rate: 0.0,
            }),
        }
    }

    // ========================================================================
    // Producers: frame buffer (ingestion) and scheduler (output)
    // ========================================================================

    #[inline]
    pub fn record_push(&self, evicted: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_repeat(&self) {
        self.repeated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Restarts the rate window. Called when the output loop starts.
    pub fn reset_window(&self) {
        let mut w = self.window.lock();
        w.start = Instant::now();
        w.handed_at_start = self.handed();
        w.rate = 0.0;
        self.frozen.store(false, Ordering::Release);
    }

    /// Closes the current window (if it spans at least 1 s) and stops rate windowing;
    /// the rate stays readable for post-run diagnostics.
    pub fn freeze(&self) {
        self.roll_window(Instant::now());
        self.frozen.store(true, Ordering::Release);
    }

    // ========================================================================
    // Consumers: diagnostics surface
    // ========================================================================

    /// Reads all counters. Rolls the rate window when at least 1 s has elapsed.
    /// Never mutates the cumulative counters.
    pub fn sample(&self) -> Stats {
        let rate = self.roll_window(Instant::now());
        self.snapshot_with_rate(rate)
    }

    pub fn rate(&self) -> f64 {
        self.sample().rate
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Frames handed to the sink on a tick, whether or not the transport was open.
    fn handed(&self) -> u64 {
        self.sent.load(Ordering::Relaxed) + self.skipped.load(Ordering::Relaxed)
    }

    fn roll_window(&self, now: Instant) -> f64 {
        let mut w = self.window.lock();
        if self.frozen.load(Ordering::Acquire) {
            return w.rate;
        }
        let elapsed = now.saturating_duration_since(w.start);
        if elapsed >= RATE_WINDOW {
            let handed = self.handed();
            w.rate = handed.saturating_sub(w.handed_at_start) as f64 / elapsed.as_secs_f64();
            w.start = now;
            w.handed_at_start = handed;
        }
        w.rate
    }

    fn snapshot_with_rate(&self, rate: f64) -> Stats {
        let processed = self.processed.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        Stats {
            rate,
            processed,
            dropped,
            drop_rate_pct: drop_rate_pct(dropped, processed),
            sent: self.sent.load(Ordering::Relaxed),
            repeated: self.repeated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rate_is_zero_without_traffic() {
        assert_eq!(drop_rate_pct(0, 0), 0.0);
        let s = PerformanceMonitor::new().sample();
        assert_eq!(s, Stats::default());
    }

    #[test]
    fn drop_rate_formula() {
        assert!((drop_rate_pct(1, 3) - 25.0).abs() < 1e-9);
        let m = PerformanceMonitor::new();
        m.record_push(false);
        m.record_push(true);
        let s = m.sample();
        assert_eq!(s.processed, 2);
        assert_eq!(s.dropped, 1);
        assert!((s.drop_rate_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sampling_never_resets_counters() {
        let m = PerformanceMonitor::new();
        for _ in 0..5 {
            m.record_push(false);
            m.record_sent();
        }
        let first = m.sample();
        let second = m.sample();
        assert_eq!(first.processed, 5);
        assert_eq!(second.processed, 5);
        assert_eq!(second.sent, 5);
    }

    #[test]
    fn rate_uses_output_deltas_over_window() {
        let m = PerformanceMonitor::new();
        let start = m.window.lock().start;
        for _ in 0..40 {
            m.record_sent();
        }
        // Ingestion volume must not leak into the rate.
        for _ in 0..1000 {
            m.record_push(false);
        }
        let rate = m.roll_window(start + Duration::from_secs(2));
        assert!((rate - 20.0).abs() < 1e-9);

        // Next window starts from the rolled baseline.
        let rate = m.roll_window(start + Duration::from_secs(3));
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn rate_is_kept_until_window_elapses() {
        let m = PerformanceMonitor::new();
        let start = m.window.lock().start;
        for _ in 0..10 {
            m.record_sent();
        }
        assert_eq!(m.roll_window(start + Duration::from_millis(500)), 0.0);
        assert!((m.roll_window(start + Duration::from_secs(1)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn frozen_rate_survives_quiet_period() {
        let m = PerformanceMonitor::new();
        let start = m.window.lock().start;
        for _ in 0..30 {
            m.record_sent();
        }
        let rate = m.roll_window(start + Duration::from_secs(1));
        m.freeze();
        assert_eq!(m.roll_window(start + Duration::from_secs(60)), rate);
    }
}
