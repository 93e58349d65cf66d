//! Test utilities & fixtures.
//! Builds an in-memory [`AppContext`] and sessions wired to memory transports.
#![allow(dead_code)]

use argon2::{Algorithm, Argon2, Params, Version};
use sensorcon::console::auth::hash_password;
use sensorcon::console::{build_registry, Console, RegistryLimits, Session, SessionKind};
use sensorcon::context::AppContext;
use sensorcon::fanout::{LogProxy, SharedBuffer};
use sensorcon::sensors::{MeasurementTrigger, NodeMcuPinMap, StaticSensorBus};
use sensorcon::settings::{MemoryBackend, OneWireAddress, SettingUpdate, SettingsStore};
use sensorcon::transport::{MemoryTransport, MemoryTransportHandle};
use std::sync::Arc;

pub const NET_EOL: u8 = b'\r';
pub const SERIAL_EOL: u8 = b'\n';
pub const PASSWORD: &str = "sensor-secret";

pub struct Harness {
    pub ctx: AppContext,
    pub backend: MemoryBackend,
    pub log: SharedBuffer,
    pub debug: SharedBuffer,
    pub trigger: MeasurementTrigger,
}

/// Cheap parameters so tests don't spend seconds hashing.
pub fn light_argon2() -> Argon2<'static> {
    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(1024, 1, 1, None).expect("argon2 params"),
    )
}

pub fn sample_addresses() -> Vec<OneWireAddress> {
    vec![
        OneWireAddress([0x28, 0xFF, 0x64, 0x1E, 0x04, 0x16, 0x03, 0x5C]),
        OneWireAddress([0x28, 0xAA, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
    ]
}

/// Context over a fresh memory backend, no console password.
pub fn harness() -> Harness {
    harness_on(MemoryBackend::new(), true)
}

pub fn harness_on(backend: MemoryBackend, bme_attached: bool) -> Harness {
    let log = SharedBuffer::new();
    let debug = SharedBuffer::new();
    let bus = StaticSensorBus::new(sample_addresses(), bme_attached);
    let trigger = bus.trigger();
    let ctx = AppContext::new(
        SettingsStore::open(Box::new(backend.clone())),
        Box::new(bus),
        Box::new(NodeMcuPinMap),
        LogProxy::new("log", Box::new(log.clone()), 4),
        LogProxy::new("debug", Box::new(debug.clone()), 4),
        light_argon2(),
    );
    Harness {
        ctx,
        backend,
        log,
        debug,
        trigger,
    }
}

/// Context whose stored console password is [`PASSWORD`].
pub fn harness_with_password() -> Harness {
    let mut h = harness();
    let phc = hash_password(&h.ctx.argon2, PASSWORD).expect("hash");
    h.ctx
        .settings
        .set(SettingUpdate::ConsolePasswordHash(&phc))
        .expect("set hash");
    h.ctx.settings.commit().expect("commit");
    h
}

pub fn network_console() -> Console {
    let registry = build_registry(SessionKind::Network, RegistryLimits::default()).expect("registry");
    Console::new(Arc::new(registry), 128, NET_EOL)
}

pub fn serial_console() -> Console {
    let registry = build_registry(SessionKind::Serial, RegistryLimits::default()).expect("registry");
    Console::new(Arc::new(registry), 128, SERIAL_EOL)
}

/// A network session already greeted; the greeting is drained.
pub fn connect_network(h: &mut Harness, peer: &str) -> (Session, MemoryTransportHandle) {
    let mut session = Session::new(SessionKind::Network, network_console());
    let (transport, handle) = MemoryTransport::pair(peer);
    assert!(session.begin(Box::new(transport), &mut h.ctx));
    handle.take_output();
    (session, handle)
}

/// A network session that has passed the password challenge.
pub fn login_network(h: &mut Harness, peer: &str) -> (Session, MemoryTransportHandle) {
    let (mut session, handle) = connect_network(h, peer);
    send(&mut session, h, &handle, PASSWORD, NET_EOL);
    handle.take_output();
    (session, handle)
}

pub fn connect_serial(h: &mut Harness) -> (Session, MemoryTransportHandle) {
    let mut session = Session::new(SessionKind::Serial, serial_console());
    let (transport, handle) = MemoryTransport::pair("serial");
    assert!(session.begin(Box::new(transport), &mut h.ctx));
    handle.take_output();
    (session, handle)
}

/// Send one line, poll once and return what the session wrote back.
pub fn send(
    session: &mut Session,
    h: &mut Harness,
    handle: &MemoryTransportHandle,
    line: &str,
    eol: u8,
) -> String {
    handle.send_line(line, eol);
    session.poll(&mut h.ctx);
    handle.take_output()
}

/// Shorthand for the serial console.
pub fn serial(session: &mut Session, h: &mut Harness, handle: &MemoryTransportHandle, line: &str) -> String {
    send(session, h, handle, line, SERIAL_EOL)
}
