//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragtier",
    version,
    author = "neur0map",
    about = "Tiered FAQ and document retrieval for student question answering",
    long_about = "ragtier embeds FAQ entries and reference documents into two vector indexes, \
                  and for each question decides whether a curated FAQ answers it outright, \
                  partially, or not at all, assembling the context and generation temperature \
                  an answering model should use."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragtier/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a folder of documents (defaults to the configured folders)
    Ingest {
        /// Folder to ingest; without it the configured FAQ and docs folders are used
        path: Option<PathBuf>,

        /// Ingest PATH into the FAQ partition instead of the general one
        #[arg(long, requires = "path")]
        faq: bool,
    },

    /// Classify a question and show the context it would be answered with
    Ask {
        /// Question text
        query: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Threshold search over general documents
    Search {
        /// Search query text
        query: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove a document by source name from both partitions
    Remove {
        /// Source name as ingested (e.g. "becas.md")
        name: String,
    },

    /// Delete every indexed document
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show index statistics
    Stats {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
