//! CLI argument definitions using clap
//!
//! Commands:
//! - txreplica inspect --config <path>
//! - txreplica rotate --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// txreplica - administration of a replicated transaction log
#[derive(Parser, Debug)]
#[command(name = "txreplica")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the transaction log and print what recovery would find
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./txreplica.json")]
        config: PathBuf,
    },

    /// Close the active log segment and start a new one
    Rotate {
        /// Path to configuration file
        #[arg(long, default_value = "./txreplica.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
