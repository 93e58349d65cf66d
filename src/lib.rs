//! # Sensorcon - Interactive Command Console for Sensor Nodes
//!
//! Sensorcon is the configuration console of an MQTT sensor node. Operators reach it
//! over a local serial line or a telnet-style network connection and use short
//! dotted commands (`s.info`, `s.set interval 60`, `c.pass ...`) to inspect and
//! change the node's persistent settings.
//!
//! ## Features
//!
//! - **Command Registry**: Named command sets with fallible, capacity-checked registration.
//! - **Data-driven Help**: Topic blocks rendered in a fixed order, filtered by prefix.
//! - **Password Challenge**: Network sessions authenticate against an Argon2id hash.
//! - **Session Pool**: A fixed number of network slots; extra connections are refused.
//! - **Log Fan-out**: Diagnostic text mirrored to every attached network session.
//! - **Settings Store**: Checksummed snapshot with explicit, idempotent commit.
//!
//! ## Quick Start
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
//!
//! ## Module Organization
//!
//! - [`console`] - Tokenizer, registry, dispatcher, sessions, pool and server loop
//! - [`settings`] - Persistent device settings and their storage backends
//! - [`fanout`] - Log proxies and session output streams
//! - [`transport`] - Serial, stdio, telnet and in-memory byte transports
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Topic, host name, password and address checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Console Server │ ← Polling loop, accept, shutdown
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Sessions / Pool │ ← One console per transport
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   AppContext    │ ← Settings, sensors, log proxies
//! └─────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod context;
pub mod fanout;
pub mod logutil;
pub mod metrics;
pub mod sensors;
pub mod settings;
pub mod transport;
pub mod validation;
