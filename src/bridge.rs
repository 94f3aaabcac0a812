//! bridge.rs
//! Bridge lifecycle: one explicit state machine instead of call-order convention.
//!
//! ```text
//!   Idle ──connect──▶ Connected ──start──▶ Running ──stop──▶ Stopped
//!     └──────────────────start──────────────▲
//! ```
//! - `start` while Idle is allowed: sends are no-op skips until a transport is attached.
//! - `start` while Running and `stop` while not Running are no-ops.
//! - `connect` while Running/Stopped and `start` while Stopped are `InvalidTransition` errors.
//!
//! Ingestion (`push_frame`) and output (scheduler thread) only meet inside `Pipeline`.
//! Optional workers follow the lifecycle: the stats reporter and UDP source run while
//! Running, the status server from `start` until `shutdown`.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use log::{info, warn};
use serde::Serialize;

use crate::advanced::status_server::StatusServer;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::ingest::{
    frame::{Frame, TestPattern},
    udp_source::UdpFrameSource,
};
use crate::output::{
    scheduler::OutputScheduler,
    sink::FrameSink,
    transport::{DeviceTransport, Transport},
};
use crate::pipeline::{IngestOutcome, Pipeline};
use crate::utils::{
    export::{ReporterOptions, StatsReporter},
    metrics::{PerformanceMonitor, Stats},
};

/// How many copies of a test pattern are queued so it goes out immediately.
const TEST_PATTERN_REPEATS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BridgeState {
    Idle = 0,
    Connected = 1,
    Running = 2,
    Stopped = 3,
}

impl BridgeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => BridgeState::Idle,
            1 => BridgeState::Connected,
            2 => BridgeState::Running,
            _ => BridgeState::Stopped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeState::Idle => "idle",
            BridgeState::Connected => "connected",
            BridgeState::Running => "running",
            BridgeState::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of the bridge for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: BridgeState,
    pub connected: bool,
    pub active: bool,
    pub active_channels: usize,
    pub channels: usize,
    pub max_value: u8,
    pub queued: usize,
    #[serde(flatten)]
    pub stats: Stats,
}

impl StatusSnapshot {
    /// Flat JSON object: snapshot fields followed by the counters.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Cloneable read-only handle for threads that report on the bridge.
#[derive(Clone)]
pub struct StatusProbe {
    state: Arc<AtomicU8>,
    pipeline: Arc<Pipeline>,
    sink: Arc<FrameSink>,
}

impl StatusProbe {
    pub fn snapshot(&self) -> StatusSnapshot {
        let (active, last) = self.pipeline.activity_view();
        StatusSnapshot {
            state: BridgeState::from_u8(self.state.load(Ordering::Acquire)),
            connected: self.sink.is_open(),
            active,
            active_channels: last.as_ref().map_or(0, |f| f.active_channels()),
            channels: self.pipeline.channels(),
            max_value: last.as_ref().map_or(0, |f| f.max_value()),
            queued: self.pipeline.queued(),
            stats: self.pipeline.monitor().sample(),
        }
    }
}

pub struct Bridge {
    config: BridgeConfig,
    state: Arc<AtomicU8>,
    pipeline: Arc<Pipeline>,
    sink: Arc<FrameSink>,
    scheduler: OutputScheduler,
    reporter: Option<StatsReporter>,
    udp: Option<UdpFrameSource>,
    status: Option<StatusServer>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let monitor = Arc::new(PerformanceMonitor::new());
        let pipeline = Arc::new(Pipeline::new(
            config.output.channels,
            config.buffer.capacity,
            monitor,
        )?);
        let sink = Arc::new(FrameSink::new(config.write_timeout()));
        let scheduler = OutputScheduler::new(config.scheduler_options(), pipeline.clone(), sink.clone());

        Ok(Self {
            config,
            state: Arc::new(AtomicU8::new(BridgeState::Idle as u8)),
            pipeline,
            sink,
            scheduler,
            reporter: None,
            udp: None,
            status: None,
        })
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, next: BridgeState) {
        let prev = self.state();
        self.state.store(next as u8, Ordering::Release);
        if prev != next {
            info!("[Bridge] {} -> {}", prev.name(), next.name());
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attaches the downstream transport. Allowed while Idle or Connected.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        match self.state() {
            BridgeState::Idle | BridgeState::Connected => {
                self.sink.attach(transport);
                self.set_state(BridgeState::Connected);
                Ok(())
            }
            from => Err(BridgeError::InvalidTransition {
                from,
                action: "connect",
            }),
        }
    }

    /// Opens the configured serial device and connects to it.
    pub fn open_device(&mut self) -> Result<()> {
        let path = self
            .config
            .output
            .device
            .clone()
            .ok_or_else(|| BridgeError::Config("no output.device configured".into()))?;
        let transport = DeviceTransport::open(&path)?;
        self.connect(Box::new(transport))
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            BridgeState::Running => Ok(()),
            BridgeState::Stopped => Err(BridgeError::InvalidTransition {
                from: BridgeState::Stopped,
                action: "start",
            }),
            BridgeState::Idle | BridgeState::Connected => {
                if !self.sink.is_open() {
                    warn!("[Bridge] starting without an open transport; output is a no-op");
                }
                self.scheduler.start()?;
                if let Err(e) = self.start_workers() {
                    self.stop_workers();
                    self.scheduler.stop();
                    return Err(e);
                }
                self.set_state(BridgeState::Running);
                Ok(())
            }
        }
    }

    fn start_workers(&mut self) -> Result<()> {
        let monitoring = self.config.monitoring.clone();
        if monitoring.enabled && self.reporter.is_none() {
            let options = ReporterOptions {
                interval: Duration::from_millis(monitoring.interval_ms),
                drop_warn_pct: monitoring.drop_warn_pct,
                csv_path: monitoring.csv_path,
            };
            self.reporter = Some(StatsReporter::spawn(self.pipeline.clone(), options)?);
        }
        if self.status.is_none() {
            if let Some(addr) = &monitoring.status_addr {
                self.status = Some(StatusServer::spawn(addr, self.status_probe())?);
            }
        }
        if self.udp.is_none() {
            if let Some(addr) = self.config.ingest.udp_bind.clone() {
                self.udp = Some(UdpFrameSource::bind(&addr, self.pipeline.clone())?);
            }
        }
        Ok(())
    }

    /// Stops the reporter and UDP source; the status server stays up until shutdown.
    fn stop_workers(&mut self) {
        if let Some(mut udp) = self.udp.take() {
            udp.stop();
        }
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
    }

    /// Stops the output loop and drains the queue. No-op unless Running.
    pub fn stop(&mut self) {
        if self.state() != BridgeState::Running {
            return;
        }
        self.stop_workers();
        self.scheduler.stop();
        let discarded = self.pipeline.drain();
        self.pipeline.monitor().freeze();
        if discarded > 0 {
            info!("[Bridge] discarded {} queued frames on stop", discarded);
        }
        self.set_state(BridgeState::Stopped);
    }

    /// Stops everything, closes the transport and returns the final stats.
    pub fn shutdown(&mut self) -> Stats {
        match self.state() {
            BridgeState::Running => self.stop(),
            BridgeState::Idle | BridgeState::Connected => self.set_state(BridgeState::Stopped),
            BridgeState::Stopped => {}
        }
        if let Some(mut status) = self.status.take() {
            status.stop();
        }
        self.sink.close();

        let stats = self.pipeline.monitor().sample();
        info!(
            "[Bridge] final stats: {:.1} FPS, {} processed, {} dropped ({:.1}%)",
            stats.rate, stats.processed, stats.dropped, stats.drop_rate_pct
        );
        stats
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Hands a decoded frame of any length to the pipeline. `None` once stopped.
    pub fn push_frame(&self, values: &[u8]) -> Option<IngestOutcome> {
        if self.state() == BridgeState::Stopped {
            return None;
        }
        Some(self.pipeline.ingest(values))
    }

    /// Preempts the queue with a test pattern.
    pub fn send_test(&self, pattern: TestPattern) -> bool {
        if self.state() == BridgeState::Stopped {
            return false;
        }
        let frame = pattern.frame(self.config.output.channels);
        let queued = self.pipeline.inject(frame, TEST_PATTERN_REPEATS);
        info!("[Bridge] test pattern {} queued x{}", pattern.name(), queued);
        true
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn rate(&self) -> f64 {
        self.pipeline.monitor().rate()
    }

    pub fn stats(&self) -> Stats {
        self.pipeline.monitor().sample()
    }

    pub fn is_active(&self) -> bool {
        self.pipeline.is_active()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_open()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.pipeline.last_frame()
    }

    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status.as_ref().and_then(|s| s.local_addr())
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().map(|u| u.local_addr())
    }

    pub fn status_probe(&self) -> StatusProbe {
        StatusProbe {
            state: self.state.clone(),
            pipeline: self.pipeline.clone(),
            sink: self.sink.clone(),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.state() != BridgeState::Stopped {
            self.shutdown();
        }
    }
}
