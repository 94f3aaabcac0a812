#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use dmx_bridge::{
    Bridge, BridgeConfig, SendError,
    output::{sink::decode_packet, transport::Transport},
};

/// Stores every packet it is given.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    packets: Arc<Mutex<Vec<Vec<u8>>>>,
    in_flight: Arc<AtomicBool>,
    write_delay: Duration,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each write holds for `delay` before it is recorded.
    pub fn slow(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Decoded channel values of every packet so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.packets
            .lock()
            .iter()
            .map(|p| decode_packet(p).expect("recorded packet should decode"))
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn is_open(&self) -> bool {
        true
    }

    fn write_packet(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), SendError> {
        self.in_flight.store(true, Ordering::Release);
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        self.packets.lock().push(bytes.to_vec());
        self.in_flight.store(false, Ordering::Release);
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Every write fails.
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn is_open(&self) -> bool {
        true
    }

    fn write_packet(&mut self, _bytes: &[u8], _timeout: Duration) -> Result<(), SendError> {
        Err(SendError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Bridge with a quiet reporter and the given rate / capacity.
pub fn test_config(rate_hz: f64, capacity: usize) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.output.channels = 8;
    config.output.rate_hz = rate_hz;
    config.buffer.capacity = capacity;
    config.monitoring.enabled = false;
    config
}

pub fn connected_bridge(config: BridgeConfig, transport: impl Transport + 'static) -> Bridge {
    let mut bridge = Bridge::new(config).expect("valid config");
    bridge.connect(Box::new(transport)).expect("connect from idle");
    bridge
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
