//! amc - Asset Manager control client
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use amc_client::{Client, ClientConfig, CoreTransport};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amc")]
#[command(about = "Control an Asset Manager over Open Sound Control")]
#[command(version)]
struct Cli {
    /// Asset Manager host address
    #[arg(short = 'i', long, visible_alias = "ip", env = "AMC_HOST")]
    host: Option<String>,

    /// Transport for control messages (tcp or udp)
    #[arg(short, long, env = "AMC_PROTOCOL")]
    protocol: Option<CoreTransport>,

    /// Path to a YAML config file
    #[arg(short, long, env = "AMC_CONFIG")]
    config: Option<PathBuf>,

    /// Base OSC address of the project, e.g. /MyProject
    #[arg(env = "AMC_BASE_ADDRESS")]
    base_address: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive REPL
    Repl,

    /// Load the project
    Load,

    /// Unload the project
    Unload,

    /// Mute or unmute the project
    Mute {
        /// true|1|false|0
        #[arg(value_parser = commands::parse_flag)]
        state: bool,
    },

    /// Set the project volume
    Volume {
        /// Linear volume between 0 and 1
        level: f32,
    },

    /// Mute or unmute the Asset Manager
    SystemMute {
        /// true|1|false|0
        #[arg(value_parser = commands::parse_flag)]
        state: bool,
    },

    /// Set the Asset Manager volume
    SystemVolume {
        /// Linear volume between 0 and 1
        level: f32,
    },

    /// Send a custom message under the base address
    Send {
        /// tcp or udp
        transport: CoreTransport,

        /// Address appended to the base address
        address: String,

        /// OSC type tags, e.g. ",ifs"
        #[arg(default_value = "")]
        tags: String,

        /// One value per non-marker type tag
        #[arg(allow_hyphen_values = true)]
        values: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(protocol) = cli.protocol {
        config.core_transport = protocol;
    }
    if let Some(base) = cli.base_address {
        config.base_address = base;
    }
    if config.base_address.is_empty() {
        eprintln!("{}: a base address is required", "Error".red());
        std::process::exit(2);
    }

    tracing::debug!(
        "Using {}:{}/{} for '{}'",
        config.host,
        config.stream_port,
        config.datagram_port,
        config.base_address
    );

    match cli.command {
        Some(Commands::Repl) | None => {
            // The shell unloads its project on exit.
            config.on_close.unload = true;
            let client = Client::new(config)?;
            repl::run(&client)?;
        }
        Some(cmd) => {
            let client = Client::new(config)?;
            match commands::execute(&client, cmd) {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
            client.close();
        }
    }

    Ok(())
}
