//! # DMX Bridge
//!
//! Paces decoded DMX frames out to a serial interface at a fixed refresh rate.
//!
//! ## Data Flow
//! - **Ingest:** decoded channel arrays → `Pipeline::ingest` → bounded drop-oldest `FrameBuffer`.
//! - **Output:** `OutputScheduler` thread pops one frame per tick (or replays the last one)
//!   and hands it to `FrameSink`, which frames it as `[0xFF][len lo][len hi][data]`.
//! - **Diagnostics:** `PerformanceMonitor` counters, periodic `StatsReporter`, HTTP status.
//!
//! `Bridge` owns all of it behind the Idle → Connected → Running → Stopped lifecycle.

pub mod advanced;
pub mod bridge;
pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod utils;

pub use bridge::{Bridge, BridgeState, StatusProbe, StatusSnapshot};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result, SendError};
pub use ingest::frame::{Frame, TestPattern};
pub use utils::metrics::Stats;
