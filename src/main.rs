//! Binary entrypoint for the sensorcon CLI.
//!
//! Commands:
//! - `start [--serial-port <path>] [--baud <n>] [--no-serial]` - run the console server
//! - `init` - write a starter `config.toml` and an initial settings snapshot
//! - `status [--json]` - print the stored settings summary and console configuration
//! - `set-password` - interactively set the network console password (argon2 hashed)
//!
//! See the library crate docs for module-level details: `sensorcon::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use sensorcon::config::Config;
use sensorcon::console::auth::hash_password;
use sensorcon::console::{ConsoleServer, StatusReport};
use sensorcon::logutil::init_logging;
use sensorcon::settings::{
    CommitOutcome, FileBackend, SettingUpdate, SettingsStore, MAX_PASSWORD_HASH_LEN,
};
use sensorcon::validation::validate_password;

#[derive(Parser)]
#[command(name = "sensorcon")]
#[command(about = "Interactive command console for MQTT sensor nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the console server
    Start {
        /// Serial device for the local console (e.g., /dev/ttyUSB0); stdin/stdout otherwise
        #[arg(short, long)]
        serial_port: Option<String>,

        /// Baud rate for --serial-port
        #[arg(short = 'b', long)]
        baud: Option<u32>,

        /// Do not open a local console at all
        #[arg(long)]
        no_serial: bool,
    },
    /// Initialize a new configuration and settings file
    Init,
    /// Show stored settings and console configuration
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set or update the network console password in the settings file
    SetPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before a config file exists
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(pre_config.as_ref().map(|c| &c.logging), cli.verbose);

    match cli.command {
        Commands::Start {
            serial_port,
            baud,
            no_serial,
        } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            if serial_port.is_some() {
                config.console.serial_port = serial_port;
            }
            if let Some(baud) = baud {
                config.console.serial_baud = baud;
            }
            if no_serial {
                config.console.serial_enabled = false;
            }
            info!("Starting sensorcon v{}", env!("CARGO_PKG_VERSION"));
            let mut server = ConsoleServer::new(config).await?;
            server.run().await?;
        }
        Commands::Init => {
            info!("Initializing new sensorcon configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let config = Config::default();
            let mut store =
                SettingsStore::open(Box::new(FileBackend::new(&config.storage.settings_file)));
            match store.commit()? {
                CommitOutcome::Written { bytes } => info!(
                    "Settings snapshot written to {} ({} bytes)",
                    config.storage.settings_file, bytes
                ),
                CommitOutcome::Unchanged => info!(
                    "Settings snapshot at {} already up to date",
                    config.storage.settings_file
                ),
            }
        }
        Commands::Status { json } => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let report = StatusReport::collect(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Commands::SetPassword => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let mut store =
                SettingsStore::open(Box::new(FileBackend::new(&config.storage.settings_file)));
            println!(
                "Setting network console password for '{}'.",
                store.get().host_name
            );
            let pass1 = rpassword::prompt_password("New password: ")?;
            if let Err(e) = validate_password(&pass1) {
                println!("Error: {}.", e);
                return Ok(());
            }
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            let hash = hash_password(&config.argon2(), &pass1)
                .map_err(|e| anyhow!("Hash error: {}", e))?;
            if hash.len() > MAX_PASSWORD_HASH_LEN {
                return Err(anyhow!(
                    "Password hash is {} bytes, longer than the {} byte field",
                    hash.len(),
                    MAX_PASSWORD_HASH_LEN
                ));
            }
            store.set(SettingUpdate::ConsolePasswordHash(&hash))?;
            if let Err(e) = store.commit() {
                warn!("Failed to save settings: {}", e);
                return Err(e.into());
            }
            println!("Console password updated successfully.");
        }
    }

    Ok(())
}
