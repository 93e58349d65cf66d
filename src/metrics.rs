//! Process-wide console counters.
//! Read by `c.stats` and the `status` subcommand.
use std::sync::atomic::{AtomicU64, Ordering};

static SESSIONS_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_REFUSED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_ACTIVE: AtomicU64 = AtomicU64::new(0);
static SESSIONS_PEAK: AtomicU64 = AtomicU64::new(0);
static AUTH_FAILURES: AtomicU64 = AtomicU64::new(0);
static LINES_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static LINES_TRUNCATED: AtomicU64 = AtomicU64::new(0);
static COMMITS: AtomicU64 = AtomicU64::new(0);

pub fn record_session_begin() {
    SESSIONS_ACCEPTED.fetch_add(1, Ordering::Relaxed);
    let active = SESSIONS_ACTIVE.fetch_add(1, Ordering::Relaxed) + 1;
    SESSIONS_PEAK.fetch_max(active, Ordering::Relaxed);
}

pub fn record_session_end() {
    // Saturating: never wrap below zero
    let _ = SESSIONS_ACTIVE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_sub(1))
    });
}

pub fn inc_sessions_refused() {
    SESSIONS_REFUSED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_auth_failures() {
    AUTH_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_lines_dispatched() {
    LINES_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_lines_truncated() {
    LINES_TRUNCATED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_commits() {
    COMMITS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Snapshot {
    pub sessions_accepted: u64,
    pub sessions_refused: u64,
    pub sessions_active: u64,
    pub sessions_peak: u64,
    pub auth_failures: u64,
    pub lines_dispatched: u64,
    pub lines_truncated: u64,
    pub commits: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sessions_accepted: SESSIONS_ACCEPTED.load(Ordering::Relaxed),
        sessions_refused: SESSIONS_REFUSED.load(Ordering::Relaxed),
        sessions_active: SESSIONS_ACTIVE.load(Ordering::Relaxed),
        sessions_peak: SESSIONS_PEAK.load(Ordering::Relaxed),
        auth_failures: AUTH_FAILURES.load(Ordering::Relaxed),
        lines_dispatched: LINES_DISPATCHED.load(Ordering::Relaxed),
        lines_truncated: LINES_TRUNCATED.load(Ordering::Relaxed),
        commits: COMMITS.load(Ordering::Relaxed),
    }
}
