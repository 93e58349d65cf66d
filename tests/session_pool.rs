mod common;

use common::*;
use sensorcon::console::{
    build_registry, Admission, RegistryLimits, SessionKind, SessionPool, SessionState,
    REFUSAL_MESSAGE,
};
use sensorcon::transport::MemoryTransport;
use std::sync::Arc;

fn pool(capacity: usize) -> SessionPool {
    let registry = build_registry(SessionKind::Network, RegistryLimits::default()).unwrap();
    SessionPool::new(capacity, Arc::new(registry), 128, NET_EOL)
}

#[test]
fn full_pool_refuses_explicitly() {
    let mut h = harness_with_password();
    let mut pool = pool(1);

    let (first, first_t) = MemoryTransport::pair("10.0.0.1:1000");
    assert_eq!(
        pool.accept(Box::new(first), &mut h.ctx),
        Admission::Accepted { slot: 0 }
    );
    assert!(first_t.take_output().contains("Please enter password"));

    let (second, second_t) = MemoryTransport::pair("10.0.0.2:1000");
    assert_eq!(pool.accept(Box::new(second), &mut h.ctx), Admission::Refused);
    assert_eq!(second_t.take_output(), REFUSAL_MESSAGE);
    assert!(second_t.is_closed());
    assert!(h
        .debug
        .contents()
        .contains("connection refused, pool full (10.0.0.2:1000)"));
    assert_eq!(pool.live_count(), 1);
    assert!(!first_t.is_closed());
}

#[test]
fn freed_slot_is_reused() {
    let mut h = harness_with_password();
    let mut pool = pool(2);

    let (a, a_t) = MemoryTransport::pair("10.0.0.1:1001");
    let (b, _b_t) = MemoryTransport::pair("10.0.0.1:1002");
    assert_eq!(pool.accept(Box::new(a), &mut h.ctx), Admission::Accepted { slot: 0 });
    assert_eq!(pool.accept(Box::new(b), &mut h.ctx), Admission::Accepted { slot: 1 });

    a_t.send_line(PASSWORD, NET_EOL);
    a_t.send_line("quit", NET_EOL);
    pool.poll_all(&mut h.ctx);
    assert!(a_t.take_output().ends_with("bye\n"));
    assert_eq!(pool.live_count(), 1);
    assert_eq!(pool.session(0).unwrap().state(), SessionState::Disconnected);

    let (c, _c_t) = MemoryTransport::pair("10.0.0.1:1003");
    assert_eq!(pool.accept(Box::new(c), &mut h.ctx), Admission::Accepted { slot: 0 });
    assert_eq!(pool.session(0).unwrap().peer(), "10.0.0.1:1003");
}

#[test]
fn each_slot_is_polled() {
    let mut h = harness_with_password();
    let mut pool = pool(2);
    let (a, a_t) = MemoryTransport::pair("10.0.0.1:1004");
    let (b, b_t) = MemoryTransport::pair("10.0.0.1:1005");
    pool.accept(Box::new(a), &mut h.ctx);
    pool.accept(Box::new(b), &mut h.ctx);
    a_t.take_output();
    b_t.take_output();

    a_t.send_line(PASSWORD, NET_EOL);
    b_t.send_line("nope", NET_EOL);
    pool.poll_all(&mut h.ctx);

    assert_eq!(
        pool.session(0).unwrap().state(),
        SessionState::Authenticated
    );
    assert_eq!(pool.session(1).unwrap().state(), SessionState::Disconnected);
    assert!(b_t.is_closed());
}

#[test]
fn reset_all_closes_everything() {
    let mut h = harness_with_password();
    let mut pool = pool(2);
    let (a, a_t) = MemoryTransport::pair("10.0.0.1:1006");
    pool.accept(Box::new(a), &mut h.ctx);
    pool.reset_all(&mut h.ctx);
    assert_eq!(pool.live_count(), 0);
    assert!(a_t.is_closed());
    assert_eq!(h.ctx.log.listener_count(), 0);
}

#[test]
fn idle_sessions_are_pruned() {
    let mut h = harness_with_password();
    let mut pool = pool(1);
    let (a, a_t) = MemoryTransport::pair("10.0.0.1:1007");
    pool.accept(Box::new(a), &mut h.ctx);
    a_t.take_output();

    assert_eq!(pool.prune_idle(0, &mut h.ctx), 0, "0 disables the timeout");
    assert_eq!(pool.prune_idle(60, &mut h.ctx), 0);

    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert_eq!(pool.prune_idle(1, &mut h.ctx), 1);
    let out = a_t.take_output();
    assert!(out.contains("session idle timeout\n"));
    assert!(out.ends_with("bye\n"));
    assert_eq!(pool.live_count(), 0);
}
