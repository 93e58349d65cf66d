//! # Console Server
//!
//! Owns the process-wide [`AppContext`], the local (serial) session and the
//! network [`SessionPool`], and drives them from one cooperative loop:
//!
//! ```text
//! loop {
//!     select! {
//!         tick      => poll serial, poll every slot, prune idle, measurement cycle
//!         accept    => hand the connection to the pool
//!         ctrl-c    => break
//!         shutdown  => break
//!     }
//! }
//! ```
//!
//! ```rust,no_run
//! use sensorcon::config::Config;
//! use sensorcon::console::ConsoleServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut server = ConsoleServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use super::commands::build_registry;
use super::dispatcher::Console;
use super::pool::{Admission, SessionPool};
use super::registry::{CommandRegistry, RegistryLimits};
use super::session::{Session, SessionKind};
use crate::config::{eol_byte, Config};
use crate::context::AppContext;
use crate::fanout::{LogFacadeSink, LogProxy};
use crate::metrics;
use crate::sensors::{MeasurementTrigger, NodeMcuPinMap, StaticSensorBus};
use crate::settings::{FileBackend, SettingsStore};
use crate::transport::stdio::StdioTransport;
use crate::transport::tcp::TelnetTransport;
use crate::transport::Transport;
use anyhow::{anyhow, Result};
use log::{debug, info, warn, Level};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub struct ConsoleServer {
    config: Config,
    ctx: AppContext,
    serial: Session,
    pool: SessionPool,
    trigger: Option<MeasurementTrigger>,
    last_measurement: Instant,
    shutdown: Arc<Notify>,
}

impl ConsoleServer {
    /// Build the production context from `config`: file-backed settings, the
    /// configured sensor bus, and log proxies feeding the `log` facade.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = FileBackend::new(&config.storage.settings_file);
        let settings = SettingsStore::open(Box::new(backend));

        let addresses = config
            .sensors
            .parsed_addresses()
            .map_err(|e| anyhow!("Invalid [sensors] entry: {}", e))?;
        let bus = StaticSensorBus::new(addresses, config.sensors.bme_attached);
        let trigger = bus.trigger();

        let listeners = config.network.max_sessions;
        let log = LogProxy::new(
            "log",
            Box::new(LogFacadeSink::new(Level::Info, "sensorcon::log")),
            listeners,
        );
        let debug = LogProxy::new(
            "debug",
            Box::new(LogFacadeSink::new(Level::Debug, "sensorcon::debug")),
            listeners,
        );
        let argon2 = config.argon2();
        let ctx = AppContext::new(
            settings,
            Box::new(bus),
            Box::new(NodeMcuPinMap),
            log,
            debug,
            argon2,
        );
        Self::from_parts(config, ctx, Some(trigger))
    }

    /// Assemble a server around an existing context. Registration errors abort.
    pub fn from_parts(
        config: Config,
        ctx: AppContext,
        trigger: Option<MeasurementTrigger>,
    ) -> Result<Self> {
        let limits = RegistryLimits {
            max_commands: config.console.max_commands,
            ..RegistryLimits::default()
        };
        let serial_registry = Arc::new(
            build_registry(SessionKind::Serial, limits)
                .map_err(|e| anyhow!("Failed to register serial console commands: {}", e))?,
        );
        let network_registry: Arc<CommandRegistry> = Arc::new(
            build_registry(SessionKind::Network, limits)
                .map_err(|e| anyhow!("Failed to register network console commands: {}", e))?,
        );
        let serial_eol = eol_byte(&config.console.serial_eol)?;
        let network_eol = eol_byte(&config.network.eol)?;
        let line_capacity = config.console.line_capacity;

        let serial = Session::new(
            SessionKind::Serial,
            Console::new(serial_registry, line_capacity, serial_eol),
        );
        let pool = SessionPool::new(
            config.network.max_sessions,
            network_registry,
            line_capacity,
            network_eol,
        );
        Ok(ConsoleServer {
            config,
            ctx,
            serial,
            pool,
            trigger,
            last_measurement: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AppContext {
        &mut self.ctx
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn serial(&self) -> &Session {
        &self.serial
    }

    /// Notify handle that stops [`run`](Self::run) from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Start the local console on `transport`.
    pub fn attach_serial(&mut self, transport: Box<dyn Transport>) -> bool {
        self.serial.begin(transport, &mut self.ctx)
    }

    pub fn accept(&mut self, transport: Box<dyn Transport>) -> Admission {
        self.pool.accept(transport, &mut self.ctx)
    }

    /// One pass over every session plus housekeeping.
    pub fn poll_once(&mut self) {
        self.serial.poll(&mut self.ctx);
        self.pool.poll_all(&mut self.ctx);

        let timeout = self.config.network.idle_timeout_secs;
        let pruned = self.pool.prune_idle(timeout, &mut self.ctx);
        if pruned > 0 {
            debug!("closed {} idle network session(s)", pruned);
        }

        let requested = self.trigger.as_ref().map(|t| t.take()).unwrap_or(false);
        let interval = Duration::from_secs(u64::from(
            self.ctx.settings.get().measurement_interval_seconds.max(1),
        ));
        if requested || self.last_measurement.elapsed() >= interval {
            self.measurement_cycle(if requested { "requested" } else { "interval" });
        }
    }

    fn measurement_cycle(&mut self, reason: &str) {
        self.last_measurement = Instant::now();
        let sensors = self
            .ctx
            .settings
            .get()
            .sensor_entries
            .iter()
            .filter(|e| !e.address.is_unset())
            .count();
        self.ctx.log.broadcast(&format!(
            "measurement cycle ({}): {} DS18B20 sensor(s) configured\n",
            reason, sensors
        ));
    }

    pub async fn bind_listener(&self) -> Result<Option<TcpListener>> {
        if !self.config.network.enabled {
            return Ok(None);
        }
        let listener = TcpListener::bind(&self.config.network.listen)
            .await
            .map_err(|e| anyhow!("Failed to listen on {}: {}", self.config.network.listen, e))?;
        info!("Network console listening on {}", self.config.network.listen);
        Ok(Some(listener))
    }

    /// Open the local console (if enabled), bind the listener and run until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        if self.config.console.serial_enabled && !self.serial.is_connected() {
            let transport = self.open_local_console()?;
            self.attach_serial(transport);
        }
        let listener = self.bind_listener().await?;
        self.run_with_listener(listener).await
    }

    fn open_local_console(&self) -> Result<Box<dyn Transport>> {
        match &self.config.console.serial_port {
            #[cfg(feature = "serial")]
            Some(port) => {
                let t = crate::transport::serial::SerialTransport::open(
                    port,
                    self.config.console.serial_baud,
                )?;
                info!("Local console on {} @ {} baud", port, self.config.console.serial_baud);
                Ok(Box::new(t))
            }
            #[cfg(not(feature = "serial"))]
            Some(port) => Err(anyhow!(
                "Serial port {} requested but built without the `serial` feature",
                port
            )),
            None => {
                info!("Local console on stdin/stdout");
                Ok(Box::new(StdioTransport::spawn()))
            }
        }
    }

    pub async fn run_with_listener(&mut self, listener: Option<TcpListener>) -> Result<()> {
        info!(
            "Console server '{}' started ({} network slot(s))",
            self.ctx.settings.get().host_name,
            self.pool.capacity()
        );
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.console.tick_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let shutdown = Arc::clone(&self.shutdown);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll_once();
                }

                accepted = async {
                    match &listener {
                        Some(l) => l.accept().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("Incoming connection from {}", addr);
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("set_nodelay failed for {}: {}", addr, e);
                            }
                            self.accept(Box::new(TelnetTransport::new(stream)));
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }

                _ = shutdown.notified() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Close every session. Unsaved (failed-commit) changes are reported, not retried.
    pub fn shutdown(&mut self) {
        info!("Shutting down console server...");
        self.pool.reset_all(&mut self.ctx);
        self.serial.reset(&mut self.ctx);
        if self.ctx.settings.is_dirty() {
            warn!("settings have uncommitted changes; they are discarded");
        }
        info!("Console server shutdown complete");
    }
}

/// Offline summary printed by the `status` subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub host_name: String,
    pub password_configured: bool,
    pub measurement_interval_seconds: u32,
    pub configured_sensors: usize,
    pub dht_enabled: bool,
    pub settings_file: String,
    pub settings_file_present: bool,
    pub network_enabled: bool,
    pub listen: String,
    pub max_sessions: usize,
    pub serial_enabled: bool,
    pub metrics: metrics::Snapshot,
}

impl StatusReport {
    pub fn collect(config: &Config) -> Self {
        let path = &config.storage.settings_file;
        let store = SettingsStore::open(Box::new(FileBackend::new(path)));
        let s = store.get();
        StatusReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            host_name: s.host_name.as_str().to_string(),
            password_configured: s.password_configured(),
            measurement_interval_seconds: s.measurement_interval_seconds,
            configured_sensors: s
                .sensor_entries
                .iter()
                .filter(|e| !e.address.is_unset())
                .count(),
            dht_enabled: s.dht_enabled(),
            settings_file: path.clone(),
            settings_file_present: Path::new(path).exists(),
            network_enabled: config.network.enabled,
            listen: config.network.listen.clone(),
            max_sessions: config.network.max_sessions,
            serial_enabled: config.console.serial_enabled,
            metrics: metrics::snapshot(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sensorcon {}", self.version)?;
        writeln!(f, "==================")?;
        writeln!(f, "Host name: {}", self.host_name)?;
        writeln!(
            f,
            "Console password: {}",
            if self.password_configured { "set" } else { "not set" }
        )?;
        writeln!(f, "Measurement interval: {} seconds", self.measurement_interval_seconds)?;
        writeln!(f, "DS18B20 sensors configured: {}", self.configured_sensors)?;
        writeln!(f, "DHT: {}", if self.dht_enabled { "on" } else { "off" })?;
        writeln!(
            f,
            "Settings file: {}{}",
            self.settings_file,
            if self.settings_file_present { "" } else { " (missing, defaults in use)" }
        )?;
        if self.network_enabled {
            writeln!(f, "Network console: {} ({} slot(s))", self.listen, self.max_sessions)?;
        } else {
            writeln!(f, "Network console: disabled")?;
        }
        write!(
            f,
            "Local console: {}",
            if self.serial_enabled { "enabled" } else { "disabled" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_fails_on_tiny_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.settings_file = dir.path().join("s.bin").to_string_lossy().into_owned();
        config.console.max_commands = 2;
        let err = ConsoleServer::new(config).await.err().unwrap();
        assert!(err.to_string().contains("register"));
    }

    #[test]
    fn status_report_defaults_without_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.settings_file = dir.path().join("none.bin").to_string_lossy().into_owned();
        let report = StatusReport::collect(&config);
        assert!(!report.settings_file_present);
        assert!(!report.password_configured);
        assert_eq!(report.measurement_interval_seconds, 1800);
        assert!(report.to_string().contains("defaults in use"));
    }
}
