//! udp_source.rs
//! Raw UDP frame source: every datagram payload is a flat channel-value array.
//! No lighting-protocol framing is parsed here; an upstream decoder (or a sender that
//! already speaks raw channel arrays) is expected on the other side.
//! - Socket built with `socket2` (address reuse) and a short read timeout so stop is prompt.
//! - One `Pipeline::ingest` call per datagram.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{BridgeError, Result};
use crate::pipeline::Pipeline;

const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Larger than any channel array the pipeline can hold.
const DATAGRAM_BUF: usize = 2048;

pub struct UdpFrameSource {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UdpFrameSource {
    pub fn bind(addr: &str, pipeline: Arc<Pipeline>) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid udp_bind '{}': {}", addr, e)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("dmx-udp".to_string())
            .spawn(move || {
                let mut buf = [0u8; DATAGRAM_BUF];
                while flag.load(Ordering::Acquire) {
                    match socket.recv_from(&mut buf) {
                        Ok((n, from)) => {
                            if n == 0 {
                                debug!("[UDP] empty datagram from {}", from);
                            }
                            pipeline.ingest(&buf[..n]);
                        }
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            warn!("[UDP] receive error: {}", e);
                            thread::sleep(READ_TIMEOUT);
                        }
                    }
                }
                debug!("[UDP] source stopped");
            })
            .map_err(|e| BridgeError::Spawn("udp", e))?;

        info!("[UDP] listening for raw frames on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for UdpFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
