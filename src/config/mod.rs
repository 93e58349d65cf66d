//! # Configuration
//!
//! Process configuration is a TOML file loaded once at startup. It covers how the
//! console is reached (serial, network), where the settings snapshot lives, and
//! logging. The device settings edited through the console (host name, sensor
//! topics, password hash) are *not* here; they live in the settings store.
//!
//! ```toml
//! [console]
//! serial_enabled = true
//! serial_eol = "\n"
//!
//! [network]
//! enabled = true
//! listen = "0.0.0.0:2323"
//! max_sessions = 1
//! eol = "\r"
//!
//! [storage]
//! settings_file = "./data/settings.bin"
//!
//! [logging]
//! level = "info"
//! file = "sensorcon.log"
//! ```
//!
//! ```rust,no_run
//! use sensorcon::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("network console on {}", config.network.listen);
//!     Ok(())
//! }
//! ```

use crate::console::registry::MAX_COMMANDS;
use crate::validation::{parse_address, AddressError};
use crate::settings::OneWireAddress;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Compile-time ceiling for `network.max_sessions`.
pub const MAX_NETWORK_SESSIONS: usize = 4;
/// Smallest accepted `console.line_capacity`.
pub const MIN_LINE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub sensors: SensorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Run a local console on stdin/stdout (or `serial_port` when set).
    pub serial_enabled: bool,
    /// Real serial device for the local console, e.g. `/dev/ttyUSB0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    pub serial_baud: u32,
    /// End-of-line byte for the local console; one of "\n" or "\r".
    pub serial_eol: String,
    /// Input line buffer size in bytes.
    pub line_capacity: usize,
    /// Registry capacity across all command sets.
    pub max_commands: usize,
    /// Poll interval of the session loop (ms).
    pub tick_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            serial_enabled: true,
            serial_port: None,
            serial_baud: 115200,
            serial_eol: "\n".to_string(),
            line_capacity: 128,
            max_commands: 48,
            tick_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub listen: String,
    /// Session pool size; at most [`MAX_NETWORK_SESSIONS`].
    pub max_sessions: usize,
    pub eol: String,
    /// Reset sessions idle for this long (0 disables).
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            enabled: true,
            listen: "0.0.0.0:2323".to_string(),
            max_sessions: 1,
            eol: "\r".to_string(),
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub settings_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            settings_file: "./data/settings.bin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: Some("sensorcon.log".to_string()),
            security_file: Some("sensorcon-security.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

/// Stand-in sensor bus contents for hosts without a 1-Wire adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SensorsConfig {
    /// 1-Wire addresses reported by `s.scan`, e.g. "28:FF:64:1E:04:16:03:5C".
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub bme_attached: bool,
}

impl SensorsConfig {
    pub fn parsed_addresses(&self) -> std::result::Result<Vec<OneWireAddress>, AddressError> {
        self.addresses.iter().map(|a| parse_address(a)).collect()
    }
}

/// Map a configured end-of-line string to its byte.
pub fn eol_byte(eol: &str) -> Result<u8> {
    match eol {
        "\n" | "\\n" | "lf" => Ok(b'\n'),
        "\r" | "\\r" | "cr" => Ok(b'\r'),
        other => Err(anyhow!("Unsupported end-of-line {:?} (use \"\\n\" or \"\\r\")", other)),
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        eol_byte(&self.console.serial_eol)?;
        eol_byte(&self.network.eol)?;
        if self.network.max_sessions == 0 || self.network.max_sessions > MAX_NETWORK_SESSIONS {
            return Err(anyhow!(
                "network.max_sessions must be between 1 and {} (got {})",
                MAX_NETWORK_SESSIONS,
                self.network.max_sessions
            ));
        }
        if self.console.line_capacity < MIN_LINE_CAPACITY {
            return Err(anyhow!(
                "console.line_capacity must be at least {} (got {})",
                MIN_LINE_CAPACITY,
                self.console.line_capacity
            ));
        }
        if self.console.max_commands > MAX_COMMANDS {
            return Err(anyhow!(
                "console.max_commands must be at most {} (got {})",
                MAX_COMMANDS,
                self.console.max_commands
            ));
        }
        if self.console.tick_ms == 0 {
            return Err(anyhow!("console.tick_ms must be greater than 0"));
        }
        self.sensors
            .parsed_addresses()
            .map_err(|e| anyhow!("Invalid [sensors] entry: {}", e))?;
        Ok(())
    }

    /// Argon2 hasher honouring `[security.argon2]` overrides.
    pub fn argon2(&self) -> argon2::Argon2<'static> {
        use argon2::{Algorithm, Argon2, Params, Version};
        let Some(a) = self.security.as_ref().and_then(|s| s.argon2.as_ref()) else {
            return Argon2::default();
        };
        let base = Params::DEFAULT;
        let params = Params::new(
            a.memory_kib.unwrap_or(base.m_cost()),
            a.time_cost.unwrap_or(base.t_cost()),
            a.parallelism.unwrap_or(base.p_cost()),
            None,
        );
        match params {
            Ok(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
            Err(e) => {
                log::warn!("Ignoring invalid [security.argon2] parameters: {}", e);
                Argon2::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            console: ConsoleConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            security: Some(SecurityConfig::default()),
            sensors: SensorsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.max_sessions, 1);
        assert_eq!(config.console.line_capacity, 128);
    }

    #[test]
    fn test_eol_byte() {
        assert_eq!(eol_byte("\n").unwrap(), b'\n');
        assert_eq!(eol_byte("\\r").unwrap(), b'\r');
        assert!(eol_byte(";").is_err());
    }

    #[test]
    fn test_session_ceiling_enforced() {
        let mut config = Config::default();
        config.network.max_sessions = MAX_NETWORK_SESSIONS + 1;
        assert!(config.validate().is_err());
        config.network.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_ceiling_enforced() {
        let mut config = Config::default();
        config.console.max_commands = MAX_COMMANDS;
        assert!(config.validate().is_ok());
        config.console.max_commands = MAX_COMMANDS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [network]
            enabled = false
            listen = "127.0.0.1:0"
            max_sessions = 2
            eol = "\r"

            [sensors]
            addresses = ["28:FF:64:1E:04:16:03:5C"]
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.network.enabled);
        assert_eq!(config.network.idle_timeout_secs, 0);
        assert!(config.console.serial_enabled);
        assert_eq!(config.sensors.parsed_addresses().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_sensor_address_rejected() {
        let mut config = Config::default();
        config.sensors.addresses = vec!["28:FF".into()];
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.network.listen, "0.0.0.0:2323");
        assert_eq!(loaded.storage.settings_file, "./data/settings.bin");
    }
}
