
//! Periodic stats reporting: overload warnings + optional CSV log.
//!
//! One background thread samples the pipeline once per interval:
//! - Logs a warning when the cumulative drop rate is above the threshold and new drops arrived.
//! - Appends one row per sample to `csv_path` (flushed every few rows to keep syscalls off the hot path).
//!
//! Sampling only reads the counters; it never feeds back into the pipeline.

use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{RecvTimeoutError, Sender, bounded};
use csv::Writer;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::error::{BridgeError, Result};
use crate::pipeline::Pipeline;
use crate::utils::metrics::Stats;

const FLUSH_ROWS: usize = 8;

#[derive(Debug, Clone)]
pub struct ReporterOptions {
    pub interval: Duration,
    pub drop_warn_pct: f64,
    pub csv_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct StatsRow {
    elapsed_ms: u64,
    rate: f64,
    processed: u64,
    dropped: u64,
    drop_rate_pct: f64,
    sent: u64,
    repeated: u64,
    skipped: u64,
    send_errors: u64,
    resyncs: u64,
    queued: usize,
    active: bool,
}

impl StatsRow {
    fn new(elapsed: Duration, s: &Stats, queued: usize, active: bool) -> Self {
        Self {
            elapsed_ms: elapsed.as_millis() as u64,
            rate: s.rate,
            processed: s.processed,
            dropped: s.dropped,
            drop_rate_pct: s.drop_rate_pct,
            sent: s.sent,
            repeated: s.repeated,
            skipped: s.skipped,
            send_errors: s.send_errors,
            resyncs: s.resyncs,
            queued,
            active,
        }
    }
}

/// True when the drop rate is over the threshold and something was dropped since `prev`.
pub fn overload_warning(prev: &Stats, now: &Stats, threshold_pct: f64) -> bool {
    now.dropped > prev.dropped && now.drop_rate_pct > threshold_pct
}

pub struct StatsReporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatsReporter {
    pub fn spawn(pipeline: Arc<Pipeline>, options: ReporterOptions) -> Result<Self> {
        // Open the file up front so a bad path is reported to the caller
        let writer = match &options.csv_path {
            Some(path) => Some(Writer::from_writer(BufWriter::new(File::create(path)?))),
            None => None,
        };

        if let Some(path) = &options.csv_path {
            info!("[Stats] logging to {}", path.display());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("dmx-stats".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut writer = writer;
                let mut prev = pipeline.monitor().sample();
                let mut pending = 0usize;

                loop {
                    match stop_rx.recv_timeout(options.interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let stats = pipeline.monitor().sample();
                    if overload_warning(&prev, &stats, options.drop_warn_pct) {
                        warn!(
                            "[Stats] {:.1} FPS, {:.1}% dropped frames ({} dropped total)",
                            stats.rate, stats.drop_rate_pct, stats.dropped
                        );
                    }

                    let failed = match writer.as_mut() {
                        Some(w) => {
                            let row = StatsRow::new(
                                started.elapsed(),
                                &stats,
                                pipeline.queued(),
                                pipeline.is_active(),
                            );
                            match w.serialize(&row) {
                                Ok(()) => {
                                    pending += 1;
                                    if pending >= FLUSH_ROWS {
                                        w.flush().ok();
                                        pending = 0;
                                    }
                                    false
                                }
                                Err(e) => {
                                    error!("[Stats] CSV write failed, disabling log: {}", e);
                                    true
                                }
                            }
                        }
                        None => false,
                    };
                    if failed {
                        writer = None;
                    }
                    prev = stats;
                }

                if let Some(mut w) = writer {
                    w.flush().ok();
                }
                debug!("[Stats] reporter exiting");
            })
            .map_err(|e| BridgeError::Spawn("stats", e))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
