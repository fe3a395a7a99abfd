//! Resync CLI
//!
//! Command-line tools for the Resync sync protocol.
//!
//! # Commands
//!
//! - `inspect` - Decode and summarise a push request or response
//! - `convert` - Re-encode a payload between JSON and CBOR
//! - `simulate` - Run several clients against an in-process server
//! - `config` - Print the default client or server configuration

mod commands;

use clap::{Parser, Subcommand};
use commands::simulate::SimulateOptions;
use resync_engine::{ConflictStrategy, SyncConfig};
use resync_protocol::WireFormat;
use resync_server::ServerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Resync command-line tools.
#[derive(Parser)]
#[command(name = "resync")]
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
    /// Decode and summarise a push request or response
    Inspect {
        /// Payload file
        path: PathBuf,

        /// Wire format of the file (json, cbor, auto)
        #[arg(short, long, default_value = "auto")]
        wire: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Re-encode a payload in another wire format
    Convert {
        /// Input payload file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Wire format of the input (json, cbor, auto)
        #[arg(long, default_value = "auto")]
        from: String,

        /// Wire format to write (json, cbor)
        #[arg(long)]
        to: String,
    },

    /// Run several clients against an in-process server
    Simulate {
        /// Number of clients
        #[arg(short, long, default_value = "3")]
        clients: usize,

        /// Number of shared records
        #[arg(short, long, default_value = "5")]
        records: usize,

        /// Edits per client
        #[arg(short, long, default_value = "5")]
        edits: usize,

        /// Conflict strategy (last-write-wins, crdt, manual)
        #[arg(short, long, default_value = "last-write-wins")]
        strategy: String,

        /// Client push batch size
        #[arg(short, long, default_value = "50")]
        batch_size: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the default configuration as JSON
    Config {
        /// Print the server configuration instead of the client one
        #[arg(short, long)]
        server: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { path, wire, format } => {
            let wire = commands::parse_format(&wire)?;
            commands::inspect::run(&path, wire, &format)?;
        }
        Commands::Convert {
            input,
            output,
            from,
            to,
        } => {
            let from = commands::parse_format(&from)?;
            let to = commands::parse_format(&to)?
                .ok_or("--to needs an explicit format (json or cbor)")?;
            commands::convert::run(&input, &output, from, to)?;
        }
        Commands::Simulate {
            clients,
            records,
            edits,
            strategy,
            batch_size,
            format,
        } => {
            let options = SimulateOptions {
                clients,
                records,
                edits,
                strategy: ConflictStrategy::from_name(&strategy),
                batch_size: batch_size.max(1),
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Config { server } => {
            let json = if server {
                serde_json::to_string_pretty(&ServerConfig::default())?
            } else {
                serde_json::to_string_pretty(&SyncConfig::default())?
            };
            println!("{json}");
        }
        Commands::Version => {
            println!("Resync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Default wire format: {}", WireFormat::default().content_type());
        }
    }

    Ok(())
}
