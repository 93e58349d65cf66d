//! Byte transports a session can run on.
//!
//! Every transport is polled, never awaited: `read_available` returns whatever is
//! buffered right now (possibly nothing) so a single loop can service the local
//! console and all network sessions in turn.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

pub mod stdio;
pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

pub use stdio::StdioTransport;
pub use tcp::TelnetTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Result of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were appended to the caller's buffer.
    Data(usize),
    /// Nothing available right now.
    Idle,
    /// The peer went away.
    Closed,
}

pub trait Transport: Send {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> ReadOutcome;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Remote identity for logs ("serial", "192.0.2.7:50211", ...).
    fn peer(&self) -> String;
}

#[derive(Debug, Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    closed: bool,
    hung_up: bool,
}

/// In-process transport for tests and embedding. The paired
/// [`MemoryTransportHandle`] plays the remote peer.
#[derive(Debug)]
pub struct MemoryTransport {
    pipe: Arc<Mutex<Pipe>>,
    peer: String,
}

#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    pipe: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    pub fn pair(peer: &str) -> (MemoryTransport, MemoryTransportHandle) {
        let pipe = Arc::new(Mutex::new(Pipe::default()));
        (
            MemoryTransport {
                pipe: pipe.clone(),
                peer: peer.to_string(),
            },
            MemoryTransportHandle { pipe },
        )
    }
}

impl Transport for MemoryTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> ReadOutcome {
        let Ok(mut pipe) = self.pipe.lock() else {
            return ReadOutcome::Closed;
        };
        if pipe.closed {
            return ReadOutcome::Closed;
        }
        if pipe.inbound.is_empty() {
            return if pipe.hung_up {
                ReadOutcome::Closed
            } else {
                ReadOutcome::Idle
            };
        }
        let n = pipe.inbound.len();
        buf.extend(pipe.inbound.drain(..));
        ReadOutcome::Data(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut pipe = self
            .pipe
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe poisoned"))?;
        if pipe.closed || pipe.hung_up {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        pipe.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut pipe) = self.pipe.lock() {
            pipe.closed = true;
        }
    }

    fn is_open(&self) -> bool {
        self.pipe
            .lock()
            .map(|p| !p.closed && !p.hung_up)
            .unwrap_or(false)
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

impl MemoryTransportHandle {
    pub fn send_bytes(&self, bytes: &[u8]) {
        if let Ok(mut pipe) = self.pipe.lock() {
            pipe.inbound.extend(bytes.iter().copied());
        }
    }

    /// Queue `line` followed by `eol`.
    pub fn send_line(&self, line: &str, eol: u8) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(eol);
        self.send_bytes(&bytes);
    }

    /// Everything the session wrote since the last call.
    pub fn take_output(&self) -> String {
        self.pipe
            .lock()
            .map(|mut p| String::from_utf8_lossy(&std::mem::take(&mut p.outbound)).into_owned())
            .unwrap_or_default()
    }

    /// True once the session side closed the transport.
    pub fn is_closed(&self) -> bool {
        self.pipe.lock().map(|p| p.closed).unwrap_or(true)
    }

    /// Simulate the remote side dropping the connection.
    pub fn hang_up(&self) {
        if let Ok(mut pipe) = self.pipe.lock() {
            pipe.hung_up = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pair_moves_bytes_both_ways() {
        let (mut t, h) = MemoryTransport::pair("test");
        let mut buf = Vec::new();
        assert_eq!(t.read_available(&mut buf), ReadOutcome::Idle);
        h.send_line("help", b'\r');
        assert_eq!(t.read_available(&mut buf), ReadOutcome::Data(5));
        assert_eq!(buf, b"help\r");
        t.write_all(b"ok\n").unwrap();
        assert_eq!(h.take_output(), "ok\n");
        assert_eq!(h.take_output(), "");
    }

    #[test]
    fn hang_up_reports_closed_after_draining() {
        let (mut t, h) = MemoryTransport::pair("test");
        h.send_bytes(b"x");
        h.hang_up();
        let mut buf = Vec::new();
        assert_eq!(t.read_available(&mut buf), ReadOutcome::Data(1));
        assert_eq!(t.read_available(&mut buf), ReadOutcome::Closed);
        assert!(!t.is_open());
        assert!(t.write_all(b"late").is_err());
    }
}
