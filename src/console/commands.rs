//! Command handlers and the registry layout for each session kind.
//!
//! Every handler that changes a setting commits the snapshot before replying;
//! if the commit fails the reply is the persistence error and the new value stays
//! in memory only.

use super::args::ArgMatch;
use super::auth::{hash_password, verify_password};
use super::dispatcher::Invocation;
use super::error::{CommandError, CommandResult, RegistryError};
use super::help;
use super::registry::{CommandRegistry, CommandSetId, RegistryLimits};
use super::session::SessionKind;
use crate::logutil::{escape_log, sec_log};
use crate::metrics;
use crate::settings::{
    BmeName, DhtTopic, DhtType, FixedStr, OneWireAddress, SettingUpdate, DHT_PIN_OFF,
    MAX_NAME_LEN, MAX_PASSWORD_HASH_LEN, MAX_SENSORS,
};
use crate::validation::{validate_host_name, validate_password, validate_topic, validate_value_name};
use log::info;
use std::fmt::Write as _;

const NOT_SET: &str = "<not set>";

/// Build the registry for `kind`. Any error here must abort startup.
pub fn build_registry(
    kind: SessionKind,
    limits: RegistryLimits,
) -> Result<CommandRegistry, RegistryError> {
    let mut r = CommandRegistry::new(limits);
    let auth = CommandSetId::AUTHENTICATED;

    r.register(auth, "help", cmd_help)?;
    r.register(auth, "version", cmd_version)?;
    r.register(auth, "c.", cmd_topic_help)?;
    r.register(auth, "c.host", cmd_host)?;
    r.register(auth, "c.pass", cmd_password)?;
    r.register(auth, "c.stats", cmd_stats)?;
    r.register(auth, "s.", cmd_topic_help)?;
    r.register(auth, "s.scan", cmd_sensor_scan)?;
    r.register(auth, "s.info", cmd_sensor_info)?;
    r.register(auth, "s.set", cmd_sensor_set)?;
    r.register(auth, "s.trig", cmd_sensor_trigger)?;

    r.add_help_topic(help::general());
    r.add_help_topic(help::console());
    r.add_help_topic(help::sensors());

    if kind == SessionKind::Network {
        r.register(auth, "quit", cmd_quit)?;
        r.set_default_handler(CommandSetId::UNAUTHENTICATED, cmd_authenticate)?;
        r.add_help_topic(help::quit());
    }
    Ok(r)
}

fn cmd_help(inv: &mut Invocation<'_>) -> CommandResult {
    let topic = inv.args.remaining();
    inv.help(topic)
}

/// `s.` and `c.` show their own block.
fn cmd_topic_help(inv: &mut Invocation<'_>) -> CommandResult {
    inv.help(inv.command)
}

fn cmd_version(_inv: &mut Invocation<'_>) -> CommandResult {
    Ok(format!("{} {}\n", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
}

fn cmd_quit(inv: &mut Invocation<'_>) -> CommandResult {
    inv.reset();
    Ok(String::new())
}

/// Default handler of the unauthenticated set: the whole line is the password.
fn cmd_authenticate(inv: &mut Invocation<'_>, line: &str) -> CommandResult {
    let stored = inv.ctx.settings.get().console_password_hash.as_str().to_string();
    let reason = if stored.is_empty() {
        "no console password configured"
    } else {
        match verify_password(&inv.ctx.argon2, line, &stored) {
            Ok(true) => {
                info!("network console login from {}", inv.peer);
                inv.switch_command_set(CommandSetId::AUTHENTICATED);
                return Ok(String::new());
            }
            Ok(false) => "wrong password",
            Err(_) => "stored password hash is unreadable",
        }
    };
    metrics::inc_auth_failures();
    sec_log!("console login failed from {}: {}", inv.peer, reason);
    inv.reset();
    Err(CommandError::AuthenticationFailure {
        reason: reason.to_string(),
    })
}

fn commit_updates(inv: &mut Invocation<'_>, updates: &[SettingUpdate<'_>]) -> Result<bool, CommandError> {
    let mut truncated = false;
    for update in updates {
        truncated |= inv.ctx.settings.set(*update)?;
    }
    inv.ctx.settings.commit()?;
    Ok(truncated)
}

/// Rejects anything left on the line once a handler has read what it needs.
fn no_more_args(inv: &Invocation<'_>) -> Result<(), CommandError> {
    match inv.args.peek() {
        Some(extra) => Err(CommandError::InvalidArgument(format!(
            "unexpected argument \"{}\"",
            extra
        ))),
        None => Ok(()),
    }
}

fn cmd_host(inv: &mut Invocation<'_>) -> CommandResult {
    let Some(name) = inv.args.next_token() else {
        return Ok(format!("host name: {}\n", inv.ctx.settings.get().host_name));
    };
    no_more_args(inv)?;
    validate_host_name(name)
        .map_err(|e| CommandError::InvalidArgument(format!("invalid host name - {}", e)))?;
    commit_updates(inv, &[SettingUpdate::HostName(name)])?;
    info!("host name changed to {}", name);
    Ok(format!("host name set to {}\n", name))
}

fn cmd_password(inv: &mut Invocation<'_>) -> CommandResult {
    let ArgMatch::Matched(password) = inv.args.rest_of_line(usize::MAX) else {
        let state = if inv.ctx.settings.get().password_configured() {
            "set"
        } else {
            "not set (network logins disabled)"
        };
        return Ok(format!("console password: {}\n", state));
    };
    validate_password(password).map_err(|e| CommandError::InvalidArgument(e.to_string()))?;
    let phc = hash_password(&inv.ctx.argon2, password)
        .map_err(|e| CommandError::Failed(format!("password hashing failed: {}", e)))?;
    if phc.len() > MAX_PASSWORD_HASH_LEN {
        return Err(CommandError::Failed(format!(
            "password hash exceeds {} bytes - lower [security.argon2] output settings",
            MAX_PASSWORD_HASH_LEN
        )));
    }
    commit_updates(inv, &[SettingUpdate::ConsolePasswordHash(&phc)])?;
    sec_log!("console password changed from {} session {}", inv.kind.label(), inv.peer);
    Ok("console password updated\n".to_string())
}

fn cmd_stats(inv: &mut Invocation<'_>) -> CommandResult {
    let m = metrics::snapshot();
    let uptime = chrono::Utc::now() - inv.ctx.started_at;
    let secs = uptime.num_seconds().max(0);
    Ok(format!(
        "uptime: {}d {:02}:{:02}:{:02}\n\
         sessions: {} active, {} peak, {} accepted, {} refused\n\
         log listeners: {} (log), {} (debug)\n\
         auth failures: {}\n\
         lines: {} dispatched, {} truncated\n\
         settings commits: {}{}\n",
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        m.sessions_active,
        m.sessions_peak,
        m.sessions_accepted,
        m.sessions_refused,
        inv.ctx.log.listener_count(),
        inv.ctx.debug.listener_count(),
        m.auth_failures,
        m.lines_dispatched,
        m.lines_truncated,
        m.commits,
        if inv.ctx.settings.is_dirty() { " (unsaved changes)" } else { "" },
    ))
}

fn cmd_sensor_scan(inv: &mut Invocation<'_>) -> CommandResult {
    let found = inv.ctx.sensors.enumerate_addresses();
    let mut out = format!(
        "Scanning for sensors ... {} found{}\n",
        found.len(),
        if found.is_empty() { "." } else { ":" }
    );
    for (i, address) in found.iter().enumerate() {
        let _ = writeln!(out, "  {}: {}", i, address);
    }
    Ok(out)
}

fn cmd_sensor_info(inv: &mut Invocation<'_>) -> CommandResult {
    let s = inv.ctx.settings.get();
    let mut out = String::new();
    let _ = writeln!(out, "DS18B20:");
    let _ = writeln!(out, "  1-Wire pin: {}", s.one_wire_pin);
    for (i, entry) in s.sensor_entries.iter().enumerate() {
        let _ = writeln!(out, "     address[{}]: {}", i, entry.address);
        let _ = writeln!(out, "       topic[{}]: {}", i, entry.topic.or("<none>"));
    }
    if s.dht_enabled() {
        let _ = writeln!(out, "DHT:");
        let _ = writeln!(out, "         pin: {}", s.dht_pin);
        let _ = writeln!(out, "        type: {}", s.dht_type.label());
        let _ = writeln!(out, "  temp topic: {}", s.dht_temperature_topic.or(NOT_SET));
        let _ = writeln!(out, "  humi topic: {}", s.dht_humidity_topic.or(NOT_SET));
    } else {
        let _ = writeln!(out, "DHT: <off>");
    }
    if inv.ctx.sensors.bme_attached() {
        let _ = writeln!(out, "BME680:");
        let _ = writeln!(out, "  base topic: {}", s.bme_base_topic.or(NOT_SET));
        let _ = writeln!(out, "   temp name: {}", s.bme_temp_name.or(NOT_SET));
        let _ = writeln!(out, "  press name: {}", s.bme_pressure_name.or(NOT_SET));
        let _ = writeln!(out, "  humid name: {}", s.bme_humidity_name.or(NOT_SET));
        let _ = writeln!(out, " gas-rs name: {}", s.bme_gas_resistance_name.or(NOT_SET));
    } else {
        let _ = writeln!(out, "BME680: <not attached>");
    }
    let _ = writeln!(out, "----");
    let _ = writeln!(out, "    interval: {} seconds", s.measurement_interval_seconds);
    Ok(out)
}

fn cmd_sensor_trigger(inv: &mut Invocation<'_>) -> CommandResult {
    inv.ctx.sensors.request_immediate_measurement();
    Ok("measurement triggered\n".to_string())
}

fn cmd_sensor_set(inv: &mut Invocation<'_>) -> CommandResult {
    const DEVICES: [&str; 4] = ["ds", "dht", "bme", "interval"];
    match inv.args.match_one_of(&DEVICES) {
        ArgMatch::Matched(0) => set_ds(inv),
        ArgMatch::Matched(1) => set_dht(inv),
        ArgMatch::Matched(2) => set_bme(inv),
        ArgMatch::Matched(_) => set_interval(inv),
        ArgMatch::Absent => Err(CommandError::MissingArgument(
            "device - should be one of {ds|dht|bme|interval}".to_string(),
        )),
        ArgMatch::Invalid => Err(CommandError::InvalidArgument(
            "invalid device - should be one of {ds|dht|bme}".to_string(),
        )),
    }
}

fn set_interval(inv: &mut Invocation<'_>) -> CommandResult {
    match inv.args.parse_uint(1, u32::MAX as u64) {
        ArgMatch::Matched(secs) => {
            no_more_args(inv)?;
            let secs = secs as u32;
            commit_updates(inv, &[SettingUpdate::MeasurementInterval(secs)])?;
            Ok(format!("Measurement interval set to {} seconds\n", secs))
        }
        ArgMatch::Absent => Ok(format!(
            "Current measurement interval: {} seconds\n",
            inv.ctx.settings.get().measurement_interval_seconds
        )),
        ArgMatch::Invalid => Err(CommandError::InvalidArgument("invalid number".to_string())),
    }
}

fn sensor_index(inv: &mut Invocation<'_>) -> Result<usize, CommandError> {
    inv.args
        .parse_uint(0, (MAX_SENSORS - 1) as u64)
        .matched()
        .map(|i| i as usize)
        .ok_or_else(|| {
            CommandError::InvalidArgument(format!(
                "invalid or no sensor index allowed range: 0 .. {}",
                MAX_SENSORS - 1
            ))
        })
}

fn set_ds(inv: &mut Invocation<'_>) -> CommandResult {
    const FIELDS: [&str; 3] = ["address", "topic", "pin"];
    match inv.args.match_one_of(&FIELDS) {
        ArgMatch::Matched(0) => {
            let index = sensor_index(inv)?;
            let mut bytes = [0u8; 8];
            for b in bytes.iter_mut() {
                match inv.args.parse_uint_radix(0, 0xFF, 16) {
                    ArgMatch::Matched(v) => *b = v as u8,
                    _ => return Err(invalid_address()),
                }
            }
            if !inv.args.is_empty() {
                return Err(invalid_address());
            }
            let address = OneWireAddress(bytes);
            commit_updates(inv, &[SettingUpdate::SensorAddress { index, address }])?;
            Ok(format!("address [{}] set to {}\n", index, address))
        }
        ArgMatch::Matched(1) => {
            let index = sensor_index(inv)?;
            let current = inv.ctx.settings.get().sensor_entries[index].topic.clone();
            set_text(
                inv,
                &format!("topic[{}]", index),
                TextKind::Topic,
                &current,
                |topic| SettingUpdate::SensorTopic { index, topic },
            )
        }
        ArgMatch::Matched(_) => set_pin(inv, PinTarget::OneWire),
        _ => Err(CommandError::InvalidArgument(
            "invalid or no configuration field - should be one of {address|topic|pin}".to_string(),
        )),
    }
}

fn invalid_address() -> CommandError {
    CommandError::InvalidArgument(
        "invalid or incomplete sensor address - required is: AA BB CC DD EE FF GG HH".to_string(),
    )
}

fn set_dht(inv: &mut Invocation<'_>) -> CommandResult {
    const FIELDS: [&str; 4] = ["pin", "type", "ttopic", "htopic"];
    match inv.args.match_one_of(&FIELDS) {
        ArgMatch::Matched(0) => {
            if inv.args.peek() == Some("off") {
                inv.args.next_token();
                no_more_args(inv)?;
                commit_updates(inv, &[SettingUpdate::DhtPin(DHT_PIN_OFF)])?;
                return Ok("dht pin set to off\n".to_string());
            }
            set_pin(inv, PinTarget::Dht)
        }
        ArgMatch::Matched(1) => match inv.args.match_one_of(&DhtType::NAMES) {
            ArgMatch::Matched(i) => {
                no_more_args(inv)?;
                let t = DhtType::ALL[i];
                commit_updates(inv, &[SettingUpdate::DhtType(t)])?;
                Ok(format!("dht type set to {}\n", t.label()))
            }
            ArgMatch::Absent => Ok(format!(
                "current dht type: {}\n",
                inv.ctx.settings.get().dht_type.label()
            )),
            ArgMatch::Invalid => Err(CommandError::InvalidArgument(
                "invalid dht type - should be one of {dht11|dht12|dht21|dht22|am2301}".to_string(),
            )),
        },
        ArgMatch::Matched(i) => {
            let (which, what) = if i == 2 {
                (DhtTopic::Temperature, "temperature topic")
            } else {
                (DhtTopic::Humidity, "humidity topic")
            };
            let s = inv.ctx.settings.get();
            let current = match which {
                DhtTopic::Temperature => s.dht_temperature_topic.clone(),
                DhtTopic::Humidity => s.dht_humidity_topic.clone(),
            };
            set_text(inv, what, TextKind::Topic, &current, |topic| {
                SettingUpdate::DhtTopic { which, topic }
            })
        }
        _ => Err(CommandError::InvalidArgument(
            "invalid or no configuration field - should be one of {pin|type|ttopic|htopic}"
                .to_string(),
        )),
    }
}

fn set_bme(inv: &mut Invocation<'_>) -> CommandResult {
    const FIELDS: [&str; 5] = ["base", "temp", "pressure", "humidity", "gas-res"];
    let field = match inv.args.match_one_of(&FIELDS) {
        ArgMatch::Matched(i) => i,
        _ => {
            return Err(CommandError::InvalidArgument(
                "invalid field - must be one of {base|temp|pressure|humidity|gas-res}".to_string(),
            ))
        }
    };
    let s = inv.ctx.settings.get();
    if field == 0 {
        let current = s.bme_base_topic.clone();
        return set_text(inv, "base topic", TextKind::Topic, &current, |topic| {
            SettingUpdate::BmeBaseTopic(topic)
        });
    }
    let (which, what, current) = match field {
        1 => (BmeName::Temperature, "temperature name", s.bme_temp_name.clone()),
        2 => (BmeName::Pressure, "pressure name", s.bme_pressure_name.clone()),
        3 => (BmeName::Humidity, "humidity name", s.bme_humidity_name.clone()),
        _ => (BmeName::GasResistance, "gas resistance name", s.bme_gas_resistance_name.clone()),
    };
    set_text(inv, what, TextKind::Name, &current, |name| {
        SettingUpdate::BmeName { which, name }
    })
}

#[derive(Debug, Clone, Copy)]
enum TextKind {
    Topic,
    Name,
}

/// Show or replace a text field. Values longer than the field are clipped.
fn set_text<const N: usize>(
    inv: &mut Invocation<'_>,
    what: &str,
    kind: TextKind,
    current: &FixedStr<N>,
    update: impl for<'v> FnOnce(&'v str) -> SettingUpdate<'v>,
) -> CommandResult {
    let full_len = inv.args.remaining().trim().len();
    let value = match inv.args.rest_of_line(N) {
        ArgMatch::Matched(v) => v,
        _ => return Ok(format!("current {}: {}\n", what, current.or(NOT_SET))),
    };
    let checked = match kind {
        TextKind::Topic => validate_topic(value),
        TextKind::Name => validate_value_name(value, MAX_NAME_LEN),
    };
    checked.map_err(|e| CommandError::InvalidArgument(format!("invalid {} - {}", what, e)))?;
    commit_updates(inv, &[update(value)])?;
    let mut reply = format!("{} set to \"{}\"", what, value);
    if full_len > value.len() {
        let _ = write!(reply, " (truncated to {} characters)", N);
        info!("{} truncated: {}", what, escape_log(value));
    }
    reply.push('\n');
    Ok(reply)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinTarget {
    OneWire,
    Dht,
}

fn set_pin(inv: &mut Invocation<'_>, target: PinTarget) -> CommandResult {
    let max = inv.ctx.pins.max_index();
    match inv.args.parse_uint(0, max as u64) {
        ArgMatch::Matched(idx) => {
            no_more_args(inv)?;
            let idx = idx as u8;
            let gpio = inv.ctx.pins.index_to_pin(idx).ok_or_else(|| {
                CommandError::Failed(format!("pin index {} has no gpio mapping", idx))
            })?;
            let update = match target {
                PinTarget::OneWire => SettingUpdate::OneWirePin(gpio),
                PinTarget::Dht => SettingUpdate::DhtPin(gpio),
            };
            commit_updates(inv, &[update])?;
            Ok(format!("pin set to idx {} (gpio {})\n", idx, gpio))
        }
        ArgMatch::Absent => {
            let s = inv.ctx.settings.get();
            let gpio = match target {
                PinTarget::OneWire => s.one_wire_pin,
                PinTarget::Dht => s.dht_pin,
            };
            if target == PinTarget::Dht && gpio == DHT_PIN_OFF {
                return Ok("current pin: off\n".to_string());
            }
            let idx = inv
                .ctx
                .pins
                .pin_to_index(gpio)
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".to_string());
            Ok(format!("current pin: {} (gpio {})\n", idx, gpio))
        }
        ArgMatch::Invalid => Err(CommandError::InvalidArgument(format!(
            "invalid pin index - allowed [0 .. {}]",
            max
        ))),
    }
}
