//! frame.rs
//! Fixed-length channel snapshots.
//! - Every frame entering the pipeline is normalized to exactly N channels
//!   (zero-padded when short, truncated when long).
//! - Frames are immutable once built; clones are independent copies.

use std::{fmt, str::FromStr};

use crate::error::BridgeError;

/// Canonical DMX universe size.
pub const DEFAULT_CHANNELS: usize = 512;
/// Largest channel count the downstream firmware accepts.
pub const MAX_CHANNELS: usize = 512;

/// One complete snapshot of all channel values.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    channels: Box<[u8]>,
}

impl Frame {
    /// Builds a frame of exactly `channels` values from an input of any length.
    pub fn normalize(values: &[u8], channels: usize) -> Self {
        let mut buf = vec![0u8; channels];
        let n = values.len().min(channels);
        buf[..n].copy_from_slice(&values[..n]);
        Self {
            channels: buf.into_boxed_slice(),
        }
    }

    /// All-zero frame (blackout).
    pub fn blank(channels: usize) -> Self {
        Self {
            channels: vec![0u8; channels].into_boxed_slice(),
        }
    }

    /// Frame with every channel at `value`.
    pub fn filled(channels: usize, value: u8) -> Self {
        Self {
            channels: vec![value; channels].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.channels
    }

    /// Value of a zero-indexed channel.
    pub fn channel(&self, index: usize) -> Option<u8> {
        self.channels.get(index).copied()
    }

    /// True iff at least one channel is nonzero.
    pub fn has_data(&self) -> bool {
        self.channels.iter().any(|&v| v > 0)
    }

    /// Number of nonzero channels.
    pub fn active_channels(&self) -> usize {
        self.channels.iter().filter(|&&v| v > 0).count()
    }

    pub fn max_value(&self) -> u8 {
        self.channels.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len())
            .field("active", &self.active_channels())
            .field("max", &self.max_value())
            .finish()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Built-in test patterns, selectable from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    AllOff,
    FirstFive,
    Dim,
    AllOn,
}

impl TestPattern {
    pub fn frame(&self, channels: usize) -> Frame {
        match self {
            TestPattern::AllOff => Frame::blank(channels),
            TestPattern::FirstFive => Frame::normalize(&[255; 5], channels),
            TestPattern::Dim => Frame::filled(channels, 128),
            TestPattern::AllOn => Frame::filled(channels, 255),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestPattern::AllOff => "all_off",
            TestPattern::FirstFive => "first_5",
            TestPattern::Dim => "dim",
            TestPattern::AllOn => "all_on",
        }
    }
}

impl FromStr for TestPattern {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_off" => Ok(TestPattern::AllOff),
            "first_5" => Ok(TestPattern::FirstFive),
            "dim" => Ok(TestPattern::Dim),
            "all_on" => Ok(TestPattern::AllOn),
            other => Err(BridgeError::Config(format!("unknown test pattern '{}'", other))),
        }
    }
}
