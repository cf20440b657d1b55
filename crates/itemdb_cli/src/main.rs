//! ItemDB CLI
//!
//! Command-line tools for inspecting ItemDB database directories.
//!
//! # Commands
//!
//! - `inspect` - Display journal size, ICN and the sync-state breakdown
//! - `dump` - Write every live item and its attributes as text
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ItemDB command-line database tools.
#[derive(Parser)]
#[command(name = "itemdb")]
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
    /// Display database statistics and sync states
    Inspect {
        /// List the items in every non-synchronized state
        #[arg(short, long)]
        items: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump all live items with their attribute values
    Dump {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Inspect { items, format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, items, &format)?;
        }
        Commands::Dump { output } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, output.as_deref())?;
        }
        Commands::Version => commands::version::run(),
    }

    Ok(())
}
