//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Queryable documentation index for OpenAPI specifications
#[derive(Debug, Parser)]
#[command(name = "specdex", version, about, max_term_width = 100)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a specification and persist its normalized form to a store
    Ingest {
        /// OpenAPI specification file (JSON, or YAML which is converted)
        spec: PathBuf,

        /// Store directory to write (created if missing)
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// API name; defaults to the specification file stem
        #[arg(long)]
        name: Option<String>,

        /// Replace an existing API with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Serve the JSON-RPC retrieval protocol over stdio
    Serve {
        /// Store directory produced by a prior ingest
        dir: PathBuf,
    },

    /// Report what a store contains
    Status {
        /// Store directory
        dir: PathBuf,

        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}
