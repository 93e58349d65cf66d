//! # Log Fan-out
//!
//! A [`LogProxy`] broadcasts diagnostic text to one primary sink plus every
//! attached [`SessionStream`]. Two proxies exist per process (general `log` and
//! verbose `debug`), each with its own attachment set.
//!
//! Session streams are outboxes: writing only appends to a shared buffer, and the
//! owning session flushes that buffer to its transport on its next poll. A
//! broadcast therefore never touches a socket and cannot fail part-way.

use log::Level;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FanoutError {
    #[error("stream {0} is already attached")]
    AlreadyAttached(u64),

    #[error("stream {0} is not attached")]
    NotAttached(u64),

    #[error("all {0} listener slots are in use")]
    Full(usize),
}

/// Output side of a session. Clones share the same outbox and identity.
#[derive(Debug, Clone)]
pub struct SessionStream {
    id: u64,
    outbox: Arc<Mutex<Vec<u8>>>,
}

impl SessionStream {
    pub fn new() -> Self {
        SessionStream {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn write_str(&self, text: &str) {
        if let Ok(mut buf) = self.outbox.lock() {
            buf.extend_from_slice(text.as_bytes());
        }
    }

    /// Drain everything written since the last call.
    pub fn take(&self) -> Vec<u8> {
        self.outbox
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    pub fn discard(&self) {
        if let Ok(mut buf) = self.outbox.lock() {
            buf.clear();
        }
    }

    pub fn pending(&self) -> usize {
        self.outbox.lock().map(|b| b.len()).unwrap_or(0)
    }
}

impl Default for SessionStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcasts text to a primary sink and a bounded set of listener streams.
pub struct LogProxy {
    name: &'static str,
    primary: Box<dyn Write + Send>,
    listeners: Vec<SessionStream>,
    capacity: usize,
}

impl LogProxy {
    pub fn new(name: &'static str, primary: Box<dyn Write + Send>, capacity: usize) -> Self {
        LogProxy {
            name,
            primary,
            listeners: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attach(&mut self, stream: &SessionStream) -> Result<(), FanoutError> {
        if self.is_attached(stream) {
            return Err(FanoutError::AlreadyAttached(stream.id()));
        }
        if self.listeners.len() >= self.capacity {
            return Err(FanoutError::Full(self.capacity));
        }
        self.listeners.push(stream.clone());
        Ok(())
    }

    pub fn detach(&mut self, stream: &SessionStream) -> Result<(), FanoutError> {
        match self.listeners.iter().position(|s| s.id() == stream.id()) {
            Some(pos) => {
                self.listeners.remove(pos);
                Ok(())
            }
            None => Err(FanoutError::NotAttached(stream.id())),
        }
    }

    pub fn is_attached(&self, stream: &SessionStream) -> bool {
        self.listeners.iter().any(|s| s.id() == stream.id())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Best-effort delivery: a failing primary sink does not stop the listeners.
    pub fn broadcast(&mut self, text: &str) {
        if let Err(e) = self
            .primary
            .write_all(text.as_bytes())
            .and_then(|_| self.primary.flush())
        {
            // Can't report through ourselves; go straight to the facade
            log::warn!("{} proxy: primary sink write failed: {}", self.name, e);
        }
        for listener in &self.listeners {
            listener.write_str(text);
        }
    }
}

/// Primary sink that forwards complete lines into the `log` facade.
pub struct LogFacadeSink {
    level: Level,
    target: &'static str,
    pending: Vec<u8>,
}

impl LogFacadeSink {
    pub fn new(level: Level, target: &'static str) -> Self {
        LogFacadeSink {
            level,
            target,
            pending: Vec::new(),
        }
    }
}

impl Write for LogFacadeSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim_end_matches('\r');
            if !text.is_empty() {
                log::log!(target: self.target, self.level, "{}", text);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable in-memory sink, handy as a primary sink in tests and tools.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut b) = self.inner.lock() {
            b.clear();
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "shared buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
