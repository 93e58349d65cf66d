//! # Session
//!
//! One session per transport. A session owns its [`Console`], the transport, and
//! the [`SessionStream`] outbox that both command replies and log fan-out write
//! into. The outbox is drained to the transport on every poll.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --begin(network)--> Unauthenticated --auth ok--> Authenticated
//!      ^                                  |                          |
//!      +-------------- reset -------------+------------ reset -------+
//! ```
//!
//! Serial sessions skip the password challenge and start authenticated. Network
//! sessions are mirrored to both log proxies while connected.

use super::dispatcher::Console;
use super::registry::CommandSetId;
use crate::context::AppContext;
use crate::fanout::{LogProxy, SessionStream};
use crate::logutil::escape_bytes;
use crate::metrics;
use crate::transport::{ReadOutcome, Transport};
use chrono::{DateTime, Utc};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Serial,
    Network,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::Serial => "serial",
            SessionKind::Network => "network",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Unauthenticated,
    Authenticated,
}

pub fn welcome_message(what: &str) -> String {
    format!(
        "Welcome to the sensor node {} interface!\nType \"help\" for available commands\n",
        what
    )
}

pub struct Session {
    kind: SessionKind,
    state: SessionState,
    console: Console,
    transport: Option<Box<dyn Transport>>,
    stream: SessionStream,
    peer: String,
    read_buf: Vec<u8>,
    connected_at: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(kind: SessionKind, console: Console) -> Self {
        Session {
            kind,
            state: SessionState::Disconnected,
            console,
            transport: None,
            stream: SessionStream::new(),
            peer: String::new(),
            read_buf: Vec::with_capacity(256),
            connected_at: None,
            last_activity: Utc::now(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn stream(&self) -> &SessionStream {
        &self.stream
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Take ownership of `transport` and greet the peer. Returns `false` (and
    /// leaves the transport untouched) when the session is already connected.
    pub fn begin(&mut self, transport: Box<dyn Transport>, ctx: &mut AppContext) -> bool {
        if self.is_connected() {
            return false;
        }
        self.peer = transport.peer();
        self.transport = Some(transport);
        self.console.clear();
        self.stream.discard();
        let now = Utc::now();
        self.connected_at = Some(now);
        self.last_activity = now;

        match self.kind {
            SessionKind::Network => {
                ctx.debug
                    .broadcast(&format!("network client connection ({})\n", self.peer));
                for proxy in [&mut ctx.log, &mut ctx.debug] {
                    if let Err(e) = proxy.attach(&self.stream) {
                        warn!("failed to add {} to {} log proxy: {}", self.peer, proxy.name(), e);
                    }
                }
                self.console.switch_command_set(CommandSetId::UNAUTHENTICATED);
                self.state = SessionState::Unauthenticated;
                metrics::record_session_begin();
                self.stream.write_str(&format!(
                    "{}Please enter password for \"{}\": ",
                    welcome_message("network"),
                    ctx.settings.get().host_name
                ));
            }
            SessionKind::Serial => {
                self.console.switch_command_set(CommandSetId::AUTHENTICATED);
                self.state = SessionState::Authenticated;
                self.stream.write_str(&welcome_message("serial"));
                self.stream.write_str(&self.prompt(ctx));
            }
        }
        self.flush();
        true
    }

    /// Say goodbye, detach from the log proxies and close the transport.
    pub fn reset(&mut self, ctx: &mut AppContext) {
        if !self.is_connected() {
            return;
        }
        self.stream.write_str("bye\n");
        if self.kind == SessionKind::Network {
            for proxy in [&mut ctx.log, &mut ctx.debug] {
                detach_logged(proxy, &self.stream, &self.peer);
            }
            metrics::record_session_end();
        }
        self.flush();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if self.kind == SessionKind::Network {
            ctx.debug
                .broadcast(&format!("network connection closed ({})\n", self.peer));
        }
        self.stream.discard();
        self.console.clear();
        self.state = SessionState::Disconnected;
        self.connected_at = None;
    }

    /// Drain the outbox to the transport. Returns `false` if the transport failed.
    pub fn flush(&mut self) -> bool {
        let pending = self.stream.take();
        if pending.is_empty() {
            return true;
        }
        match self.transport.as_mut() {
            Some(t) => match t.write_all(&pending) {
                Ok(()) => true,
                Err(e) => {
                    debug!("write to {} failed: {}", self.peer, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Read whatever the transport has and run every complete line.
    pub fn poll(&mut self, ctx: &mut AppContext) {
        if !self.is_connected() {
            return;
        }
        if !self.flush() {
            self.drop_connection(ctx, "write failed");
            return;
        }

        self.read_buf.clear();
        let outcome = match self.transport.as_mut() {
            Some(t) => t.read_available(&mut self.read_buf),
            None => ReadOutcome::Closed,
        };
        match outcome {
            ReadOutcome::Idle => return,
            ReadOutcome::Closed => {
                self.drop_connection(ctx, "peer closed");
                return;
            }
            ReadOutcome::Data(_) => self.last_activity = Utc::now(),
        }

        let bytes = std::mem::take(&mut self.read_buf);
        for &b in &bytes {
            let Some(line) = self.console.push_byte(b) else {
                continue;
            };
            if line.truncated {
                metrics::inc_lines_truncated();
                warn!(
                    "{}: input line exceeded {} bytes and was truncated: {}",
                    self.peer,
                    self.console.capacity(),
                    escape_bytes(line.text.as_bytes())
                );
            }
            let outcome =
                self.console
                    .dispatch(&line.text, ctx, self.kind, &self.peer, &self.stream);
            if outcome.reset_requested {
                // Rest of the input belonged to the closed session
                self.reset(ctx);
                break;
            }
            self.state = if self.console.active_set() == CommandSetId::AUTHENTICATED {
                SessionState::Authenticated
            } else {
                SessionState::Unauthenticated
            };
            self.stream.write_str(&self.prompt(ctx));
        }
        self.read_buf = bytes;

        if self.is_connected() && !self.flush() {
            self.drop_connection(ctx, "write failed");
        }
    }

    /// True when nothing was received for longer than `timeout_secs`.
    pub fn is_idle(&self, timeout_secs: u64) -> bool {
        if !self.is_connected() || timeout_secs == 0 {
            return false;
        }
        let limit = chrono::Duration::seconds(timeout_secs.min(i64::MAX as u64) as i64);
        Utc::now() - self.last_activity > limit
    }

    pub fn expire(&mut self, ctx: &mut AppContext) {
        if !self.is_connected() {
            return;
        }
        debug!("{} session {} idle, closing", self.kind.label(), self.peer);
        self.stream.write_str("\nsession idle timeout\n");
        self.reset(ctx);
    }

    fn drop_connection(&mut self, ctx: &mut AppContext, why: &str) {
        debug!("{} session {}: {}", self.kind.label(), self.peer, why);
        self.reset(ctx);
    }

    fn prompt(&self, ctx: &AppContext) -> String {
        match (self.kind, self.state) {
            (_, SessionState::Disconnected) | (_, SessionState::Unauthenticated) => String::new(),
            (SessionKind::Network, SessionState::Authenticated) => {
                format!("{}> ", ctx.settings.get().host_name)
            }
            (SessionKind::Serial, SessionState::Authenticated) => "> ".to_string(),
        }
    }
}

fn detach_logged(proxy: &mut LogProxy, stream: &SessionStream, peer: &str) {
    if let Err(e) = proxy.detach(stream) {
        warn!("failed to remove {} from {} log proxy: {}", peer, proxy.name(), e);
    }
}
