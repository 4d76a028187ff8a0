//! ktrepl CLI
//!
//! Command-line tools for Kyoto Tycoon replication logs.
//!
//! # Commands
//!
//! - `tail` - Follow a master's update log and print each entry
//! - `decode` - Decode a single hex-encoded entry payload
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use ktrepl_slave::{RetryConfig, SlaveConfig, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Kyoto Tycoon replication log tools.
#[derive(Parser)]
#[command(name = "ktrepl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the master's update log
    Tail {
        /// Master host name or address
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Master port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Socket timeout in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Server id of this slave (0-65535)
        #[arg(short, long, allow_negative_numbers = true)]
        slave_id: i64,

        /// Start from this timestamp (nanoseconds since the epoch, default now)
        #[arg(long)]
        since: Option<u64>,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Reconnect attempts after a connection failure
        #[arg(short, long, default_value = "0")]
        reconnect: u32,
    },

    /// Decode a hex-encoded entry payload
    Decode {
        /// Payload bytes in hex
        hex: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Tail {
            host,
            port,
            timeout,
            slave_id,
            since,
            limit,
            format,
            reconnect,
        } => {
            let config = SlaveConfig::try_new(slave_id)?
                .with_host(host)
                .with_port(port)
                .with_timeout(Duration::from_secs(timeout));
            let retry = RetryConfig::new(reconnect.saturating_add(1));
            let options = commands::tail::TailOptions {
                since_ns: since,
                limit,
                format: format.parse()?,
                retry,
            };
            let client = ktrepl_slave::ReplicationClient::new(config);
            let printed = commands::tail::run(&client, &options, &mut std::io::stdout().lock())?;
            tracing::info!(entries = printed, "tail finished");
        }
        Commands::Decode { hex, format } => {
            commands::decode::run(&hex, format.parse()?, &mut std::io::stdout().lock())?;
        }
        Commands::Version => {
            println!("ktrepl CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "replication protocol magic 0x{:02X}",
                ktrepl_codec::MAGIC_REPLICATION
            );
        }
    }

    Ok(())
}
