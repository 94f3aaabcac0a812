//! transport.rs
//! Byte-oriented write channels consumed by the frame sink.
//! - `DeviceTransport`: character device (USB serial adapter) opened non-blocking;
//!   a write that cannot complete within the timeout fails instead of stalling the output loop.
//! - `WriterTransport`: any `io::Write` whose writes are already bounded (sockets, pipes, null sink).
//!
//! Line settings (baud rate) are expected to be configured on the device beforehand.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use log::info;

use crate::error::SendError;

const WOULD_BLOCK_BACKOFF: Duration = Duration::from_micros(200);

/// Downstream write channel.
pub trait Transport: Send {
    /// `false` means sends become no-ops rather than errors.
    fn is_open(&self) -> bool;

    /// Writes the whole packet or fails within roughly `timeout`.
    fn write_packet(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), SendError>;

    fn close(&mut self) {}

    fn describe(&self) -> String;
}

pub struct DeviceTransport {
    path: PathBuf,
    file: Option<File>,
}

impl DeviceTransport {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_nonblocking(&path)?;
        info!("[Transport] opened {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }
}

#[cfg(unix)]
fn open_nonblocking(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
}

#[cfg(not(unix))]
fn open_nonblocking(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(path)
}

impl Transport for DeviceTransport {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn write_packet(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), SendError> {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return Err(SendError::Io(io::ErrorKind::NotConnected.into())),
        };
        write_with_deadline(file, bytes, timeout)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            info!("[Transport] closed {}", self.path.display());
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Retries partial and `WouldBlock` writes until the packet is out or the deadline passes.
pub fn write_with_deadline<W: Write>(
    w: &mut W,
    mut bytes: &[u8],
    timeout: Duration,
) -> Result<(), SendError> {
    let deadline = Instant::now() + timeout;
    while !bytes.is_empty() {
        match w.write(bytes) {
            Ok(0) => return Err(SendError::Io(io::ErrorKind::WriteZero.into())),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(SendError::Timeout(timeout));
                }
                thread::sleep(WOULD_BLOCK_BACKOFF);
            }
            Err(e) => return Err(SendError::Io(e)),
        }
    }
    Ok(())
}

pub struct WriterTransport<W: Write + Send> {
    name: String,
    writer: Option<W>,
}

impl<W: Write + Send> WriterTransport<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Some(writer),
        }
    }
}

impl<W: Write + Send> Transport for WriterTransport<W> {
    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn write_packet(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), SendError> {
        match self.writer.as_mut() {
            Some(w) => write_with_deadline(w, bytes, timeout),
            None => Err(SendError::Io(io::ErrorKind::NotConnected.into())),
        }
    }

    fn close(&mut self) {
        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
