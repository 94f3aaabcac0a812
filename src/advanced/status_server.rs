//! Read-only HTTP status endpoint.
//!
//! - `GET /stats`  → JSON snapshot of state, activity and counters.
//! - `GET /health` → `ok` while the output loop is running, 503 otherwise.
//! - anything else → 404.
//!
//! Served from one thread with `recv_timeout` so stop never waits on a client.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};
use tiny_http::{Header, Method, Response, Server};

use crate::bridge::{BridgeState, StatusProbe};
use crate::error::{BridgeError, Result};

const POLL: Duration = Duration::from_millis(100);

pub struct StatusServer {
    addr: Option<SocketAddr>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatusServer {
    pub fn spawn(addr: &str, probe: StatusProbe) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| BridgeError::StatusServer(e.to_string()))?;
        let local = server.server_addr().to_ip();

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("dmx-status".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    let request = match server.recv_timeout(POLL) {
                        Ok(Some(r)) => r,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("[Status] accept failed: {}", e);
                            continue;
                        }
                    };

                    let (code, body, json) = route(request.method(), request.url(), &probe);
                    let mut response = Response::from_string(body).with_status_code(code);
                    let content_type = if json { "application/json" } else { "text/plain" };
                    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
                        response = response.with_header(h);
                    }
                    if let Err(e) = request.respond(response) {
                        debug!("[Status] client went away: {}", e);
                    }
                }
                debug!("[Status] server stopped");
            })
            .map_err(|e| BridgeError::Spawn("status", e))?;

        info!("[Status] serving on {}", addr);
        Ok(Self {
            addr: local,
            running,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Returns (status code, body, is_json).
fn route(method: &Method, url: &str, probe: &StatusProbe) -> (u16, String, bool) {
    if *method != Method::Get {
        return (405, "method not allowed".into(), false);
    }
    let path = url.split('?').next().unwrap_or(url);
    match path {
        "/stats" => match probe.snapshot().to_json() {
            Ok(json) => (200, json, true),
            Err(e) => (500, format!("could not encode stats: {}", e), false),
        },
        "/health" => {
            if probe.snapshot().state == BridgeState::Running {
                (200, "ok".into(), false)
            } else {
                (503, "not running".into(), false)
            }
        }
        _ => (404, "not found".into(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::BridgeConfig;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn serves_stats_health_and_404() {
        let mut config = BridgeConfig::default();
        config.monitoring.enabled = false;
        let bridge = Bridge::new(config).unwrap();
        bridge.push_frame(&[9, 9]);

        let mut server = StatusServer::spawn("127.0.0.1:0", bridge.status_probe()).unwrap();
        let addr = server.local_addr().unwrap();

        let stats = get(addr, "/stats");
        assert!(stats.starts_with("HTTP/1.1 200"));
        assert!(stats.contains(r#""processed":1"#));

        let health = get(addr, "/health");
        assert!(health.starts_with("HTTP/1.1 503"));

        assert!(get(addr, "/nope").starts_with("HTTP/1.1 404"));
        server.stop();
    }

    #[test]
    fn bad_address_is_reported() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        assert!(matches!(
            StatusServer::spawn("not an address", bridge.status_probe()),
            Err(BridgeError::StatusServer(_))
        ));
    }
}
