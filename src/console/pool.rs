//! Fixed-size pool of network sessions.
//!
//! Slots are allocated once and reused. A connection that finds no free slot
//! gets a one-line refusal and is closed straight away.

use super::dispatcher::Console;
use super::registry::CommandRegistry;
use super::session::{Session, SessionKind};
use crate::context::AppContext;
use crate::logutil::sec_log;
use crate::metrics;
use crate::transport::Transport;
use log::{debug, warn};
use std::sync::Arc;

pub const REFUSAL_MESSAGE: &str = "too many connections - try again later\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { slot: usize },
    Refused,
}

pub struct SessionPool {
    slots: Vec<Session>,
}

impl SessionPool {
    pub fn new(capacity: usize, registry: Arc<CommandRegistry>, line_capacity: usize, eol: u8) -> Self {
        let slots = (0..capacity)
            .map(|_| {
                Session::new(
                    SessionKind::Network,
                    Console::new(Arc::clone(&registry), line_capacity, eol),
                )
            })
            .collect();
        SessionPool { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Hand `transport` to the first free slot, or refuse it.
    pub fn accept(&mut self, mut transport: Box<dyn Transport>, ctx: &mut AppContext) -> Admission {
        match self.slots.iter().position(|s| !s.is_connected()) {
            Some(slot) => {
                let peer = transport.peer();
                if self.slots[slot].begin(transport, ctx) {
                    debug!("network session {} in slot {}", peer, slot);
                    Admission::Accepted { slot }
                } else {
                    warn!("slot {} reported free but refused {}", slot, peer);
                    Admission::Refused
                }
            }
            None => {
                let peer = transport.peer();
                if let Err(e) = transport.write_all(REFUSAL_MESSAGE.as_bytes()) {
                    debug!("refusal to {} not delivered: {}", peer, e);
                }
                transport.close();
                ctx.debug
                    .broadcast(&format!("connection refused, pool full ({})\n", peer));
                sec_log!("network connection from {} refused: all {} slots busy", peer, self.capacity());
                metrics::inc_sessions_refused();
                Admission::Refused
            }
        }
    }

    pub fn poll_all(&mut self, ctx: &mut AppContext) {
        for session in self.slots.iter_mut() {
            session.poll(ctx);
        }
    }

    /// Close sessions that have been silent for longer than `timeout_secs`.
    pub fn prune_idle(&mut self, timeout_secs: u64, ctx: &mut AppContext) -> usize {
        let mut pruned = 0;
        for session in self.slots.iter_mut().filter(|s| s.is_idle(timeout_secs)) {
            session.expire(ctx);
            pruned += 1;
        }
        pruned
    }

    pub fn reset_all(&mut self, ctx: &mut AppContext) {
        for session in self.slots.iter_mut() {
            session.reset(ctx);
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_connected()).count()
    }

    pub fn session(&self, slot: usize) -> Option<&Session> {
        self.slots.get(slot)
    }
}
