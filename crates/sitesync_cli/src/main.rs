//! sitesync CLI
//!
//! Operator tools for the durable store file of a sitesync client.
//!
//! # Commands
//!
//! - `inspect` - Display log statistics and queue/conflict counts
//! - `queue` - List queued mutations in replay order
//! - `conflicts` - List conflicts
//! - `verify` - Scan the log for damage without repairing it
//! - `compact` - Rewrite the log with live records only
//! - `clear-queue` - Abandon every queued mutation

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// sitesync store tools.
#[derive(Parser)]
#[command(name = "sitesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
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
    /// Display log statistics and queue/conflict counts
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List queued mutations in replay order
    Queue {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List unresolved conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(short, long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Scan the log for damage without repairing it
    Verify,

    /// Rewrite the log with live records only
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Abandon every queued mutation
    ClearQueue {
        /// Confirm; the queue cannot be recovered
        #[arg(long)]
        yes: bool,
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut out = std::io::stdout().lock();
    let path = || cli.path.clone().ok_or("store path required (--path)");

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&path()?, format, &mut out)?,
        Commands::Queue { format } => commands::queue::run(&path()?, format, &mut out)?,
        Commands::Conflicts { all, format } => {
            commands::conflicts::run(&path()?, all, format, &mut out)?;
        }
        Commands::Verify => commands::verify::run(&path()?, &mut out)?,
        Commands::Compact { dry_run } => commands::compact::run(&path()?, dry_run, &mut out)?,
        Commands::ClearQueue { yes } => commands::clear_queue::run(&path()?, yes, &mut out)?,
        Commands::Version => {
            println!("sitesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
