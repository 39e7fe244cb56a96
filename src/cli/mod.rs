//! CLI interface for Morpho

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Control-parameter mapping for granular synthesis
#[derive(Parser)]
#[command(name = "morpho")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "morpho.yaml")]
        config: PathBuf,
    },

    /// Dry-run a sound against the offline engine and print every message
    Trace {
        /// Configuration file path
        #[arg(short, long, default_value = "morpho.yaml")]
        config: PathBuf,

        /// Sound to trigger, as "<source>.<event>"
        #[arg(short, long)]
        sound: String,

        /// Control-parameter values, as "name=value"
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,

        /// Seed for the intra-morph random draws
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate an example configuration file
    Init,
}
