//! # Settings Snapshot
//!
//! The device keeps exactly one configuration record in memory. Command handlers
//! mutate it through [`store::SettingsStore::set`] and persist it with an explicit
//! [`store::SettingsStore::commit`]; nothing is written implicitly.
//!
//! All string fields are fixed-capacity ([`FixedStr`]). Writes past the capacity
//! are truncated on a character boundary, never rejected and never overflowing.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod store;

pub use store::{CommitOutcome, FileBackend, MemoryBackend, SettingsBackend, SettingsStore, StoreError};

/// Number of 1-Wire sensor slots.
pub const MAX_SENSORS: usize = 4;
/// Maximum MQTT topic length (bytes, excluding terminator).
pub const MAX_TOPIC_LEN: usize = 63;
/// Maximum MQTT value name length.
pub const MAX_NAME_LEN: usize = 24;
pub const MAX_HOST_NAME_LEN: usize = 31;
pub const MAX_PASSWORD_HASH_LEN: usize = 127;

/// Marker stored in `dht_pin` when no DHT sensor is wired.
pub const DHT_PIN_OFF: u8 = 0xFF;
pub const DEFAULT_HOST_NAME: &str = "mqtt-temp-sensor";
pub const DEFAULT_MEASUREMENT_INTERVAL_SECONDS: u32 = 60 * 30;
/// GPIO behind NodeMCU pin D4.
pub const DEFAULT_ONE_WIRE_PIN: u8 = 2;

/// A string with a hard byte capacity `N`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FixedStr<const N: usize>(String);

impl<const N: usize> FixedStr<N> {
    pub const CAPACITY: usize = N;

    pub fn new(value: &str) -> Self {
        let mut s = Self::default();
        s.set(value);
        s
    }

    /// Replace the contents. Returns `true` when the value had to be truncated.
    pub fn set(&mut self, value: &str) -> bool {
        let clipped = clip_to_boundary(value, N);
        self.0.clear();
        self.0.push_str(clipped);
        clipped.len() < value.len()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Display helper used by the info listings.
    pub fn or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        if self.0.is_empty() {
            placeholder
        } else {
            &self.0
        }
    }
}

impl<const N: usize> From<String> for FixedStr<N> {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl<const N: usize> From<FixedStr<N>> for String {
    fn from(value: FixedStr<N>) -> Self {
        value.0
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
pub fn clip_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// 8-byte 1-Wire device address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OneWireAddress(pub [u8; 8]);

impl OneWireAddress {
    pub fn is_unset(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for OneWireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtType {
    Dht11,
    Dht12,
    Dht21,
    Dht22,
    Am2301,
}

impl DhtType {
    /// Command-line spellings, index-aligned with [`DhtType::ALL`].
    pub const NAMES: [&'static str; 5] = ["dht11", "dht12", "dht21", "dht22", "am2301"];
    pub const ALL: [DhtType; 5] = [
        DhtType::Dht11,
        DhtType::Dht12,
        DhtType::Dht21,
        DhtType::Dht22,
        DhtType::Am2301,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DhtType::Dht11 => "DHT11",
            DhtType::Dht12 => "DHT12",
            DhtType::Dht21 => "DHT21",
            DhtType::Dht22 => "DHT22",
            DhtType::Am2301 => "AM2301",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub address: OneWireAddress,
    pub topic: FixedStr<MAX_TOPIC_LEN>,
}

/// Which DHT topic a value targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtTopic {
    Temperature,
    Humidity,
}

/// BME680 value name fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmeName {
    Temperature,
    Pressure,
    Humidity,
    GasResistance,
}

/// The complete configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub host_name: FixedStr<MAX_HOST_NAME_LEN>,
    /// Argon2 PHC string; empty means network logins are disabled.
    pub console_password_hash: FixedStr<MAX_PASSWORD_HASH_LEN>,
    pub one_wire_pin: u8,
    pub measurement_interval_seconds: u32,
    pub sensor_entries: [SensorEntry; MAX_SENSORS],
    pub dht_pin: u8,
    pub dht_type: DhtType,
    pub dht_temperature_topic: FixedStr<MAX_TOPIC_LEN>,
    pub dht_humidity_topic: FixedStr<MAX_TOPIC_LEN>,
    pub bme_base_topic: FixedStr<MAX_TOPIC_LEN>,
    pub bme_temp_name: FixedStr<MAX_NAME_LEN>,
    pub bme_pressure_name: FixedStr<MAX_NAME_LEN>,
    pub bme_humidity_name: FixedStr<MAX_NAME_LEN>,
    pub bme_gas_resistance_name: FixedStr<MAX_NAME_LEN>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host_name: FixedStr::new(DEFAULT_HOST_NAME),
            console_password_hash: FixedStr::default(),
            one_wire_pin: DEFAULT_ONE_WIRE_PIN,
            measurement_interval_seconds: DEFAULT_MEASUREMENT_INTERVAL_SECONDS,
            sensor_entries: Default::default(),
            dht_pin: DHT_PIN_OFF,
            dht_type: DhtType::Dht11,
            dht_temperature_topic: FixedStr::default(),
            dht_humidity_topic: FixedStr::default(),
            bme_base_topic: FixedStr::default(),
            bme_temp_name: FixedStr::new("temperature"),
            bme_pressure_name: FixedStr::new("pressure"),
            bme_humidity_name: FixedStr::new("humidity"),
            bme_gas_resistance_name: FixedStr::new("gas-resistance"),
        }
    }
}

impl Settings {
    pub fn dht_enabled(&self) -> bool {
        self.dht_pin != DHT_PIN_OFF
    }

    pub fn password_configured(&self) -> bool {
        !self.console_password_hash.is_empty()
    }
}

/// A single field mutation, applied by [`store::SettingsStore::set`].
#[derive(Debug, Clone, Copy)]
pub enum SettingUpdate<'a> {
    HostName(&'a str),
    ConsolePasswordHash(&'a str),
    OneWirePin(u8),
    MeasurementInterval(u32),
    SensorAddress { index: usize, address: OneWireAddress },
    SensorTopic { index: usize, topic: &'a str },
    DhtPin(u8),
    DhtType(DhtType),
    DhtTopic { which: DhtTopic, topic: &'a str },
    BmeBaseTopic(&'a str),
    BmeName { which: BmeName, name: &'a str },
}
