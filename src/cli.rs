//! CLI definitions for opsum.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// opsum CLI.
#[derive(Parser)]
#[command(name = "opsum")]
#[command(about = "Summarization coordination for a shared ordered op log")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "OPSUM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a summarizer against an in-process sequencer
    Simulate {
        /// Number of document ops to sequence (overrides the config)
        #[arg(long)]
        ops: Option<u64>,

        /// Reject every n-th summary (overrides the config)
        #[arg(long)]
        nack_every: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a configuration file
    CheckConfig,
}
