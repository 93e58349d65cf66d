//! Process-wide state shared by every session, built once at startup.

use crate::fanout::LogProxy;
use crate::sensors::{PinMap, SensorBus};
use crate::settings::SettingsStore;
use argon2::Argon2;
use chrono::{DateTime, Utc};

pub struct AppContext {
    pub settings: SettingsStore,
    pub sensors: Box<dyn SensorBus>,
    pub pins: Box<dyn PinMap>,
    /// General log proxy.
    pub log: LogProxy,
    /// Verbose log proxy.
    pub debug: LogProxy,
    pub argon2: Argon2<'static>,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(
        settings: SettingsStore,
        sensors: Box<dyn SensorBus>,
        pins: Box<dyn PinMap>,
        log: LogProxy,
        debug: LogProxy,
        argon2: Argon2<'static>,
    ) -> Self {
        AppContext {
            settings,
            sensors,
            pins,
            log,
            debug,
            argon2,
            started_at: Utc::now(),
        }
    }
}
