use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat search bot: `/av <code>` and `/game <name>` lookups
#[derive(Parser)]
#[command(name = "seekbot")]
#[command(about = "Answers /av and /game chat commands with aggregated forward messages", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./seekbot.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch one chat message and print the reply
    Ask {
        /// Message text, e.g. "/av abc123"
        text: Vec<String>,
    },
    /// Read chat messages from stdin, one per line
    Listen,
    /// Delete cached game info
    ClearCache {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
        /// Only entries whose TTL has passed
        #[arg(long, conflicts_with = "prefix")]
        expired: bool,
    },
    /// Compact the database
    Vacuum,
    /// Print record and cache counts
    Stats,
    /// Print the effective configuration
    Config,
}
