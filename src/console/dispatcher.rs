//! # Command Console
//!
//! Turns a byte stream into lines and lines into exactly one handler invocation.
//!
//! ```text
//!   Idle --byte--> Accumulating --eol--> Dispatching --handler returns--> Idle
//! ```
//!
//! The line buffer is bounded. Bytes past capacity are dropped until the next
//! end-of-line and the clipped line is still dispatched once, flagged as
//! truncated. Handlers never touch console state directly: they file requests
//! (switch command set, reset session) on the [`Invocation`] which are applied
//! after the handler has returned.

use super::args::Args;
use super::error::CommandError;
use super::help::HelpProvider;
use super::registry::{CommandRegistry, CommandSetId};
use super::session::SessionKind;
use crate::context::AppContext;
use crate::fanout::SessionStream;
use crate::metrics;
use std::sync::Arc;

const BACKSPACE: u8 = 0x08;
const DEL: u8 = 0x7F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    Idle,
    Accumulating,
    Dispatching,
}

/// A complete input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// False for blank lines, which never reach a handler.
    pub invoked: bool,
    pub reset_requested: bool,
}

#[derive(Debug, Default)]
struct Requests {
    switch_to: Option<CommandSetId>,
    reset: bool,
}

/// Everything a handler may see or ask for while it runs.
pub struct Invocation<'a> {
    /// First token of the line as typed.
    pub command: &'a str,
    pub args: Args<'a>,
    pub ctx: &'a mut AppContext,
    pub kind: SessionKind,
    pub peer: &'a str,
    registry: &'a CommandRegistry,
    requests: Requests,
}

impl<'a> Invocation<'a> {
    pub fn new(
        command: &'a str,
        args: &'a str,
        ctx: &'a mut AppContext,
        kind: SessionKind,
        peer: &'a str,
        registry: &'a CommandRegistry,
    ) -> Self {
        Invocation {
            command,
            args: Args::new(args),
            ctx,
            kind,
            peer,
            registry,
            requests: Requests::default(),
        }
    }

    /// Make `set` the active command set once this handler returns.
    pub fn switch_command_set(&mut self, set: CommandSetId) {
        self.requests.switch_to = Some(set);
    }

    /// End the session once this handler returns.
    pub fn reset(&mut self) {
        self.requests.reset = true;
    }

    /// Help text for `topic` from this console's registry.
    pub fn help(&self, topic: &str) -> Result<String, CommandError> {
        self.registry
            .render_help(topic)
            .ok_or_else(|| CommandError::NoMatch(topic.trim().to_string()))
    }
}

pub struct Console {
    registry: Arc<CommandRegistry>,
    buffer: Vec<u8>,
    capacity: usize,
    eol: u8,
    overflowed: bool,
    active_set: CommandSetId,
    state: ConsoleState,
}

impl Console {
    pub fn new(registry: Arc<CommandRegistry>, capacity: usize, eol: u8) -> Self {
        Console {
            registry,
            buffer: Vec::with_capacity(capacity),
            capacity,
            eol,
            overflowed: false,
            active_set: CommandSetId::AUTHENTICATED,
            state: ConsoleState::Idle,
        }
    }

    pub fn state(&self) -> ConsoleState {
        self.state
    }

    pub fn active_set(&self) -> CommandSetId {
        self.active_set
    }

    pub fn switch_command_set(&mut self, set: CommandSetId) {
        self.active_set = set;
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial input.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
        self.state = ConsoleState::Idle;
    }

    /// Feed one byte. Returns the completed line when `byte` is the end-of-line.
    pub fn push_byte(&mut self, byte: u8) -> Option<Line> {
        if byte == self.eol {
            let line = Line {
                text: String::from_utf8_lossy(&self.buffer).into_owned(),
                truncated: self.overflowed,
            };
            self.buffer.clear();
            self.overflowed = false;
            self.state = ConsoleState::Idle;
            return Some(line);
        }
        match byte {
            // The other half of CR/LF pairs
            b'\r' | b'\n' => {}
            BACKSPACE | DEL => {
                self.buffer.pop();
            }
            b'\t' | 0x20..=0xFF => {
                if self.buffer.len() < self.capacity {
                    self.buffer.push(byte);
                } else {
                    self.overflowed = true;
                }
            }
            _ => {}
        }
        self.state = if self.buffer.is_empty() {
            ConsoleState::Idle
        } else {
            ConsoleState::Accumulating
        };
        None
    }

    /// Run one line to completion, writing the reply to `out`.
    pub fn dispatch(
        &mut self,
        line: &str,
        ctx: &mut AppContext,
        kind: SessionKind,
        peer: &str,
        out: &SessionStream,
    ) -> DispatchOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return DispatchOutcome::default();
        }
        self.state = ConsoleState::Dispatching;
        metrics::inc_lines_dispatched();

        let registry = Arc::clone(&self.registry);
        let (command, rest) = match trimmed.find([' ', '\t']) {
            Some(pos) => trimmed.split_at(pos),
            None => (trimmed, ""),
        };
        let mut inv = Invocation::new(command, rest, ctx, kind, peer, &registry);

        let result = match registry.lookup(self.active_set, command) {
            Some(descriptor) => (descriptor.handler)(&mut inv),
            None => match registry.default_handler_for(self.active_set) {
                Some(handler) => handler(&mut inv, line),
                None => Err(CommandError::NoMatch(command.to_string())),
            },
        };
        let requests = inv.requests;

        match result {
            Ok(text) => out.write_str(&text),
            Err(e) => out.write_str(&format!("{}\n", e)),
        }
        if let Some(set) = requests.switch_to {
            self.active_set = set;
        }
        self.state = ConsoleState::Idle;
        DispatchOutcome {
            invoked: true,
            reset_requested: requests.reset,
        }
    }
}
