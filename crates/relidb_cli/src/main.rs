//! relidb CLI
//!
//! Command-line tools for relidb store directories.
//!
//! # Commands
//!
//! - `inspect` - Display bucket and relationship statistics
//! - `dump-journal` - Dump committed change-log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relidb command-line store tools.
#[derive(Parser)]
#[command(name = "relidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Store name (the `<name>` in `<name>.bdb`)
    #[arg(global = true, short, long)]
    name: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display bucket and relationship statistics
    Inspect,

    /// Dump committed change-log records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect => {
            let path = cli.path.ok_or("store path required for inspect")?;
            let name = cli.name.ok_or("store name required for inspect")?;
            commands::inspect::run(&path, &name)?;
        }
        Commands::DumpJournal { limit, format } => {
            let path = cli.path.ok_or("store path required for dump-journal")?;
            let name = cli.name.ok_or("store name required for dump-journal")?;
            commands::dump_journal::run(&path, &name, limit, &format)?;
        }
        Commands::Version => {
            println!("relidb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("relidb core v{}", relidb_core::VERSION);
        }
    }

    Ok(())
}
