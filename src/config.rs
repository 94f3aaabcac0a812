//! Bridge configuration, loaded from TOML.
//!
//! Every field has a default so an empty (or missing) file yields a working
//! 512-channel, 88 Hz bridge with a 50-frame buffer.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::ingest::frame::{DEFAULT_CHANNELS, MAX_CHANNELS};
use crate::output::scheduler::SchedulerOptions;

/// Standard DMX refresh rate; the output loop runs at twice this by default.
pub const DMX_FPS: f64 = 44.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub output: OutputConfig,
    pub buffer: BufferConfig,
    pub ingest: IngestConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Serial device, e.g. `/dev/ttyUSB0`. Without one the bridge runs with no-op sends.
    pub device: Option<PathBuf>,
    pub channels: usize,
    pub rate_hz: f64,
    pub write_timeout_ms: u64,
    pub spin_window_us: u64,
    pub realtime_priority: bool,
    pub core: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: DEFAULT_CHANNELS,
            rate_hz: DMX_FPS * 2.0,
            write_timeout_ms: 100,
            spin_window_us: 2_000,
            realtime_priority: false,
            core: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address for the raw UDP frame source, e.g. `0.0.0.0:6455`.
    pub udp_bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub drop_warn_pct: f64,
    pub csv_path: Option<PathBuf>,
    pub status_addr: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            drop_warn_pct: 5.0,
            csv_path: None,
            status_addr: None,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let out = &self.output;
        if out.channels == 0 || out.channels > MAX_CHANNELS {
            return Err(BridgeError::Config(format!(
                "output.channels must be 1..={}, got {}",
                MAX_CHANNELS, out.channels
            )));
        }
        if !(out.rate_hz.is_finite() && out.rate_hz > 0.0) {
            return Err(BridgeError::Config(format!(
                "output.rate_hz must be positive, got {}",
                out.rate_hz
            )));
        }
        if Duration::from_micros(out.spin_window_us) >= Duration::from_secs_f64(1.0 / out.rate_hz) {
            return Err(BridgeError::Config(format!(
                "output.spin_window_us must be shorter than one output interval, got {}",
                out.spin_window_us
            )));
        }
        if out.write_timeout_ms == 0 {
            return Err(BridgeError::Config("output.write_timeout_ms must be > 0".into()));
        }
        if self.buffer.capacity == 0 {
            return Err(BridgeError::Config("buffer.capacity must be >= 1".into()));
        }
        if self.monitoring.interval_ms == 0 {
            return Err(BridgeError::Config("monitoring.interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.output.write_timeout_ms)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            rate_hz: self.output.rate_hz,
            spin_window: Duration::from_micros(self.output.spin_window_us),
            realtime_priority: self.output.realtime_priority,
            core: self.output.core,
        }
    }
}
