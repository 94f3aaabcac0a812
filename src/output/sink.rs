//! sink.rs
//! Encodes frames into the serial wire packet and writes them through a `Transport`.
//!
//! Wire packet: `[0xFF][count_lo][count_hi][channel_0 .. channel_{count-1}]`, 3 + N bytes.
//! - Closed/absent transport: `SendOutcome::Skipped`, not an error (startup order stays free).
//! - Write failure: `SendError`, no retry; the next tick retries with fresh data.
//! - `is_open` / `describe` read cached state and never wait behind an in-flight write.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::info;
use parking_lot::Mutex;

use crate::error::{BridgeError, SendError};
use crate::ingest::frame::{Frame, MAX_CHANNELS};
use crate::output::transport::Transport;

pub const PACKET_MARKER: u8 = 0xFF;
pub const HEADER_LEN: usize = 3;

/// Appends the wire packet for `frame` to `buf` (cleared first).
pub fn encode_into(frame: &Frame, buf: &mut Vec<u8>) {
    let count = frame.len() as u16;
    buf.clear();
    buf.reserve(HEADER_LEN + frame.len());
    buf.push(PACKET_MARKER);
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(frame.as_slice());
}

pub fn encode_packet(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + frame.len());
    encode_into(frame, &mut buf);
    buf
}

/// Parses one wire packet back into channel values, rejecting what the
/// downstream firmware would reject (bad marker, zero or oversized count, short payload).
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<u8>, BridgeError> {
    if bytes.len() < HEADER_LEN {
        return Err(BridgeError::MalformedPacket(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    if bytes[0] != PACKET_MARKER {
        return Err(BridgeError::MalformedPacket(format!(
            "bad marker 0x{:02X}",
            bytes[0]
        )));
    }
    let count = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
    if count == 0 || count > MAX_CHANNELS {
        return Err(BridgeError::MalformedPacket(format!("channel count {}", count)));
    }
    let payload = &bytes[HEADER_LEN..];
    if payload.len() < count {
        return Err(BridgeError::MalformedPacket(format!(
            "payload {} bytes, header says {}",
            payload.len(),
            count
        )));
    }
    Ok(payload[..count].to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Packet written to an open transport.
    Sent,
    /// No open transport; nothing written.
    Skipped,
}

struct SinkInner {
    transport: Option<Box<dyn Transport>>,
    packet: Vec<u8>,
}

pub struct FrameSink {
    inner: Mutex<SinkInner>,
    open: AtomicBool,
    label: Mutex<Option<String>>,
    write_timeout: Duration,
}

impl FrameSink {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                transport: None,
                packet: Vec::with_capacity(HEADER_LEN + MAX_CHANNELS),
            }),
            open: AtomicBool::new(false),
            label: Mutex::new(None),
            write_timeout,
        }
    }

    pub fn with_transport(transport: Box<dyn Transport>, write_timeout: Duration) -> Self {
        let sink = Self::new(write_timeout);
        sink.attach(transport);
        sink
    }

    /// Installs a transport, closing any previous one.
    pub fn attach(&self, transport: Box<dyn Transport>) {
        let mut inner = self.inner.lock();
        if let Some(mut old) = inner.transport.take() {
            old.close();
        }
        let label = transport.describe();
        info!("[Sink] attached transport {}", label);
        self.open.store(transport.is_open(), Ordering::Release);
        *self.label.lock() = Some(label);
        inner.transport = Some(transport);
    }

    pub fn send(&self, frame: &Frame) -> Result<SendOutcome, SendError> {
        let mut guard = self.inner.lock();
        let SinkInner { transport, packet } = &mut *guard;

        let transport = match transport {
            Some(t) if t.is_open() => t,
            _ => {
                self.open.store(false, Ordering::Release);
                return Ok(SendOutcome::Skipped);
            }
        };

        encode_into(frame, packet);
        let written = transport.write_packet(packet, self.write_timeout);
        self.open.store(transport.is_open(), Ordering::Release);
        written?;
        Ok(SendOutcome::Sent)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn describe(&self) -> Option<String> {
        self.label.lock().clone()
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        self.open.store(false, Ordering::Release);
        self.label.lock().take();
        if let Some(mut t) = inner.transport.take() {
            t.close();
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}
