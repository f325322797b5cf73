//! Shoebox CLI
//!
//! Command-line tools for inspecting and repairing Shoebox databases.
//!
//! # Commands
//!
//! - `inspect` - Display key counts per prefix and persisted metadata
//! - `scan` - Dump keys under a prefix
//! - `queue` - List pending network operations
//! - `fsck` - Repair derived index entries

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shoebox command-line database tools.
#[derive(Parser)]
#[command(name = "shoebox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display key counts per prefix and persisted metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump keys under a prefix
    Scan {
        /// Key prefix; empty scans everything
        #[arg(long, default_value = "")]
        prefix: String,

        /// Maximum number of keys to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Walk from the last key backwards
        #[arg(short, long)]
        reverse: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List pending network operations in service order
    Queue {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Repair derived index entries of every table
    Fsck {
        /// Run even if the repair watermark is current
        #[arg(long)]
        force: bool,

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
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Scan {
            prefix,
            limit,
            reverse,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for scan")?;
            commands::scan::run(&path, &prefix, limit, reverse, &format)?;
        }
        Commands::Queue { format } => {
            let path = cli.path.ok_or("Database path required for queue")?;
            commands::queue::run(&path, &format)?;
        }
        Commands::Fsck { force, format } => {
            let path = cli.path.ok_or("Database path required for fsck")?;
            commands::fsck::run(&path, force, &format)?;
        }
        Commands::Version => {
            println!("Shoebox CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Shoebox Core v{}", shoebox_core::VERSION);
        }
    }

    Ok(())
}
