//! Sensor-side collaborators used by the console.
//!
//! The console never talks to hardware. It asks a [`SensorBus`] for attached
//! 1-Wire addresses and for an out-of-band measurement, and maps user-facing pin
//! indices to GPIO numbers through a [`PinMap`].

use crate::settings::OneWireAddress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait SensorBus: Send {
    /// Addresses currently visible on the 1-Wire bus.
    fn enumerate_addresses(&mut self) -> Vec<OneWireAddress>;
    /// Ask for a readout before the interval expires.
    fn request_immediate_measurement(&mut self);
    fn bme_attached(&self) -> bool;
}

pub trait PinMap: Send + Sync {
    fn index_to_pin(&self, index: u8) -> Option<u8>;
    fn pin_to_index(&self, pin: u8) -> Option<u8>;
    /// Highest valid pin index.
    fn max_index(&self) -> u8;
}

/// NodeMCU board labels D0..D8.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeMcuPinMap;

const NODEMCU_GPIO: [u8; 9] = [16, 5, 4, 0, 2, 14, 12, 13, 15];

impl PinMap for NodeMcuPinMap {
    fn index_to_pin(&self, index: u8) -> Option<u8> {
        NODEMCU_GPIO.get(index as usize).copied()
    }

    fn pin_to_index(&self, pin: u8) -> Option<u8> {
        NODEMCU_GPIO.iter().position(|g| *g == pin).map(|i| i as u8)
    }

    fn max_index(&self) -> u8 {
        (NODEMCU_GPIO.len() - 1) as u8
    }
}

/// Shared flag between the bus and the server's measurement loop.
#[derive(Debug, Clone, Default)]
pub struct MeasurementTrigger(Arc<AtomicBool>);

impl MeasurementTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume a pending trigger.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Bus backed by a fixed address list (from `[sensors]` in the config file).
#[derive(Debug, Clone, Default)]
pub struct StaticSensorBus {
    addresses: Vec<OneWireAddress>,
    bme_attached: bool,
    trigger: MeasurementTrigger,
}

impl StaticSensorBus {
    pub fn new(addresses: Vec<OneWireAddress>, bme_attached: bool) -> Self {
        StaticSensorBus {
            addresses,
            bme_attached,
            trigger: MeasurementTrigger::new(),
        }
    }

    pub fn trigger(&self) -> MeasurementTrigger {
        self.trigger.clone()
    }
}

impl SensorBus for StaticSensorBus {
    fn enumerate_addresses(&mut self) -> Vec<OneWireAddress> {
        self.addresses.clone()
    }

    fn request_immediate_measurement(&mut self) {
        self.trigger.fire();
    }

    fn bme_attached(&self) -> bool {
        self.bme_attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodemcu_pins_round_trip_known_labels() {
        let map = NodeMcuPinMap;
        assert_eq!(map.index_to_pin(4), Some(2));
        assert_eq!(map.pin_to_index(2), Some(4));
        assert_eq!(map.index_to_pin(9), None);
        assert_eq!(map.pin_to_index(1), None);
        assert_eq!(map.max_index(), 8);
    }

    #[test]
    fn trigger_is_consumed_once() {
        let mut bus = StaticSensorBus::new(vec![], false);
        let trigger = bus.trigger();
        assert!(!trigger.take());
        bus.request_immediate_measurement();
        assert!(trigger.take());
        assert!(!trigger.take());
    }
}
