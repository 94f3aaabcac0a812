//! scheduler.rs
//! Fixed-rate output loop: the only consumer of the frame buffer.
//!
//! - Real-time pacing: monotonic `next_tick` deadline, coarse wait on the stop channel,
//!   then `SpinSleeper` for the last `spin_window` to bound wake-up jitter.
//! - Empty queue: the last known frame is resent so the hardware never starves.
//! - Drift correction: when the loop falls a full interval behind, `next_tick` is
//!   resynchronised to `now + interval` instead of bursting catch-up sends.
//! - Stop: the coarse wait wakes immediately on the stop signal; a send already handed
//!   to the sink completes, none start afterwards.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::error::{BridgeError, Result};
use crate::output::sink::{FrameSink, SendOutcome};
use crate::pipeline::{FrameOrigin, Pipeline};

/// Spin sleeper native accuracy hint (ns).
const NATIVE_ACCURACY_NS: u32 = 100_000;

/// Longest stretch spent in `SpinSleeper`, where the stop signal is not watched.
pub const MAX_SPIN_WINDOW: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub rate_hz: f64,
    /// Tail of each wait that is spun instead of slept.
    pub spin_window: Duration,
    pub realtime_priority: bool,
    pub core: Option<usize>,
}

impl SchedulerOptions {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz,
            spin_window: Duration::from_millis(2),
            realtime_priority: false,
            core: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

pub struct OutputScheduler {
    options: SchedulerOptions,
    pipeline: Arc<Pipeline>,
    sink: Arc<FrameSink>,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputScheduler {
    pub fn new(options: SchedulerOptions, pipeline: Arc<Pipeline>, sink: Arc<FrameSink>) -> Self {
        Self {
            options,
            pipeline,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.handle.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Spawns the output thread. No-op when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if !(self.options.rate_hz.is_finite() && self.options.rate_hz > 0.0) {
            return Err(BridgeError::Config(format!(
                "output rate must be positive, got {}",
                self.options.rate_hz
            )));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        self.running.store(true, Ordering::Release);
        self.pipeline.monitor().reset_window();

        let worker = OutputWorker {
            options: self.options.clone(),
            pipeline: self.pipeline.clone(),
            sink: self.sink.clone(),
            running: self.running.clone(),
            stop_rx,
        };

        let builder = thread::Builder::new().name("dmx-output".to_string());
        let spawned = if self.options.realtime_priority {
            builder.spawn_with_priority(ThreadPriority::Max, move |prio| {
                if let Err(e) = prio {
                    warn!("[Scheduler] could not raise thread priority: {:?}", e);
                }
                worker.run();
            })
        } else {
            builder.spawn(move || worker.run())
        };

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                info!(
                    "[Scheduler] started at {:.1} Hz (interval {:?})",
                    self.options.rate_hz,
                    self.options.interval()
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(BridgeError::Spawn("output", e))
            }
        }
    }

    /// Signals the output thread and joins it. No-op when not running.
    /// When this returns no further sends can happen.
    pub fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return,
        };

        self.running.store(false, Ordering::Release);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }

        match handle.join() {
            Ok(()) => info!("[Scheduler] stopped"),
            Err(_) => error!("[Scheduler] output thread panicked"),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }
}

impl Drop for OutputScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct OutputWorker {
    options: SchedulerOptions,
    pipeline: Arc<Pipeline>,
    sink: Arc<FrameSink>,
    running: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
}

impl OutputWorker {
    fn run(self) {
        if let Some(core) = self.options.core {
            pin_to_core(core);
        }

        let interval = self.options.interval();
        let spin_window = self.options.spin_window.min(interval).min(MAX_SPIN_WINDOW);
        let sleeper = SpinSleeper::new(NATIVE_ACCURACY_NS).with_spin_strategy(SpinStrategy::YieldThread);
        let monitor = self.pipeline.monitor().clone();

        let mut next_tick = Instant::now();
        let mut failing = 0u64;

        loop {
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let now = Instant::now();
            if now >= next_tick {
                // ============================================================
                // Tick: fresh frame if queued, otherwise replay last known
                // ============================================================
                if let Some(out) = self.pipeline.next_frame() {
                    // stop() may have landed while we were waking up
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    if out.origin == FrameOrigin::Repeat {
                        monitor.record_repeat();
                    }

                    match self.sink.send(&out.frame) {
                        Ok(outcome) => {
                            match outcome {
                                SendOutcome::Sent => monitor.record_sent(),
                                SendOutcome::Skipped => monitor.record_skipped(),
                            }
                            if out.origin == FrameOrigin::Fresh {
                                self.pipeline.mark_sent(&out);
                            }
                            if failing > 0 {
                                info!("[Scheduler] transport recovered after {} failed writes", failing);
                                failing = 0;
                            }
                        }
                        Err(e) => {
                            monitor.record_send_error();
                            if failing == 0 {
                                warn!("[Scheduler] frame write failed: {}", e);
                            }
                            failing += 1;
                        }
                    }
                }

                // ============================================================
                // Schedule next tick; resync instead of bursting when behind
                // ============================================================
                next_tick += interval;
                let after = Instant::now();
                if next_tick < after {
                    let behind = after - next_tick;
                    next_tick = after + interval;
                    monitor.record_resync();
                    debug!("[Scheduler] fell behind by {:?}; resynchronised", behind);
                }
            } else {
                let remaining = next_tick - now;
                if remaining > spin_window {
                    // Coarse wait doubles as the stop signal
                    match self.stop_rx.recv_timeout(remaining - spin_window) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                } else {
                    sleeper.sleep(remaining);
                }
            }
        }

        debug!("[Scheduler] output loop exited");
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) => {
            if core_affinity::set_for_current(*id) {
                info!("[Scheduler] output thread pinned to core {}", core);
            } else {
                warn!("[Scheduler] failed to pin output thread to core {}", core);
            }
        }
        None => warn!("[Scheduler] core {} not available; running unpinned", core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::PerformanceMonitor;

    fn scheduler(rate_hz: f64) -> OutputScheduler {
        scheduler_with(SchedulerOptions::new(rate_hz))
    }

    fn scheduler_with(options: SchedulerOptions) -> OutputScheduler {
        let monitor = Arc::new(PerformanceMonitor::new());
        let pipeline = Arc::new(Pipeline::new(16, 4, monitor).unwrap());
        let sink = Arc::new(FrameSink::new(Duration::from_millis(5)));
        OutputScheduler::new(options, pipeline, sink)
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut s = scheduler(200.0);
        assert_eq!(s.state(), SchedulerState::Stopped);
        s.stop();

        s.start().unwrap();
        s.start().unwrap();
        assert!(s.is_running());

        s.stop();
        s.stop();
        assert_eq!(s.state(), SchedulerState::Stopped);
    }

    #[test]
    fn rejects_non_positive_rate() {
        let mut s = scheduler(0.0);
        assert!(matches!(s.start(), Err(BridgeError::Config(_))));
        assert!(!s.is_running());
    }

    #[test]
    fn stop_wakes_a_long_sleep_promptly() {
        let mut s = scheduler(0.5);
        s.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let t = Instant::now();
        s.stop();
        assert!(t.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn oversized_spin_window_still_stops_promptly() {
        let mut options = SchedulerOptions::new(0.5);
        options.spin_window = Duration::from_secs(5);
        let mut s = scheduler_with(options);
        s.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let t = Instant::now();
        s.stop();
        assert!(t.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn idle_ticks_with_nothing_to_send() {
        let mut s = scheduler(500.0);
        s.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        s.stop();
        let stats = s.pipeline.monitor().sample();
        assert_eq!(stats.sent + stats.skipped + stats.repeated, 0);
    }

    #[test]
    fn interval_from_rate() {
        assert_eq!(SchedulerOptions::new(100.0).interval(), Duration::from_millis(10));
    }
}
