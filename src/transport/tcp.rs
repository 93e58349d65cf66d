//! Telnet-style TCP transport.
//!
//! Clients are plain `telnet`/`nc`. Option negotiation is never answered; IAC
//! sequences are stripped from the input so they cannot reach the line buffer.

use super::{ReadOutcome, Transport};
use log::{debug, warn};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Outbound bytes a slow peer may leave unsent before we give up on it.
const MAX_PENDING_OUTPUT: usize = 16 * 1024;

/// Input consumed from one peer per poll; the rest waits for the next tick.
pub const MAX_READ_PER_POLL: usize = 512;

/// How long a closed connection may take to drain its last output.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterState {
    #[default]
    Data,
    Iac,
    Option,
    Sub,
    SubIac,
}

/// Removes telnet command sequences from a byte stream, across read boundaries.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            self.state = match (self.state, b) {
                (FilterState::Data, IAC) => FilterState::Iac,
                (FilterState::Data, _) => {
                    out.push(b);
                    FilterState::Data
                }
                // Escaped 0xFF data byte
                (FilterState::Iac, IAC) => {
                    out.push(IAC);
                    FilterState::Data
                }
                (FilterState::Iac, WILL..=DONT) => FilterState::Option,
                (FilterState::Iac, SB) => FilterState::Sub,
                (FilterState::Iac, _) => FilterState::Data,
                (FilterState::Option, _) => FilterState::Data,
                (FilterState::Sub, IAC) => FilterState::SubIac,
                (FilterState::Sub, _) => FilterState::Sub,
                (FilterState::SubIac, SE) => FilterState::Data,
                (FilterState::SubIac, _) => FilterState::Sub,
            };
        }
    }
}

pub struct TelnetTransport {
    stream: Option<TcpStream>,
    peer: String,
    filter: TelnetFilter,
    pending: Vec<u8>,
}

impl TelnetTransport {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        TelnetTransport {
            stream: Some(stream),
            peer,
            filter: TelnetFilter::default(),
            pending: Vec::new(),
        }
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        };
        while !self.pending.is_empty() {
            match stream.try_write(&self.pending) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed")),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Write out what a closed transport still owed its peer, then shut the socket down.
async fn drain_and_shutdown(mut stream: TcpStream, pending: Vec<u8>, peer: String) {
    let result = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, async {
        stream.write_all(&pending).await?;
        stream.shutdown().await
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("final output to {} not delivered: {}", peer, e),
        Err(_) => debug!(
            "final output to {} timed out after {:?}",
            peer, CLOSE_FLUSH_TIMEOUT
        ),
    }
}

impl Transport for TelnetTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> ReadOutcome {
        if self.flush_pending().is_err() {
            self.stream = None;
            return ReadOutcome::Closed;
        }
        let Some(stream) = self.stream.as_ref() else {
            return ReadOutcome::Closed;
        };
        let mut raw = [0u8; 256];
        let before = buf.len();
        let mut consumed = 0;
        while consumed < MAX_READ_PER_POLL {
            let want = raw.len().min(MAX_READ_PER_POLL - consumed);
            match stream.try_read(&mut raw[..want]) {
                Ok(0) => {
                    self.stream = None;
                    return if buf.len() > before {
                        ReadOutcome::Data(buf.len() - before)
                    } else {
                        ReadOutcome::Closed
                    };
                }
                Ok(n) => {
                    consumed += n;
                    self.filter.feed(&raw[..n], buf);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("telnet read error from {}: {}", self.peer, e);
                    self.stream = None;
                    return ReadOutcome::Closed;
                }
            }
        }
        match buf.len() - before {
            0 => ReadOutcome::Idle,
            n => ReadOutcome::Data(n),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.pending.extend_from_slice(bytes);
        self.flush_pending()?;
        if self.pending.len() > MAX_PENDING_OUTPUT {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "peer is not reading its output",
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(e) = self.flush_pending() {
            debug!("telnet flush on close to {} failed: {}", self.peer, e);
            self.pending.clear();
        }
        let Some(stream) = self.stream.take() else {
            return;
        };
        if self.pending.is_empty() {
            return;
        }
        // A socket fresh from accept() may not be writable yet; finish on the runtime
        let pending = std::mem::take(&mut self.pending);
        let peer = self.peer.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain_and_shutdown(stream, pending, peer));
            }
            Err(_) => warn!(
                "dropping {} unsent bytes to {}: no runtime to flush on",
                pending.len(),
                peer
            ),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
