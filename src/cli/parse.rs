//! CLI parse: clap types for temper. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Temper CLI - schema-enforced generation pipelines
#[derive(Parser, Debug)]
#[command(name = "temper")]
#[command(about = "Run schema-enforced generation, refine loops and fan-out batches")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config file)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate configuration; list contracts and pipelines
    Validate,
    /// Run a configured or built-in pipeline and print the JSON result
    Run {
        /// Pipeline name
        pipeline: String,
        /// Input context as a JSON object, or @path to a JSON file
        #[arg(long)]
        input: String,
        /// Cap on concurrent items for fan-out stages
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Attempts per invocation, overriding configuration
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Print only the final stage value instead of the full result
        #[arg(long)]
        final_only: bool,
    },
    /// List built-in scenarios
    Scenarios {
        /// Print the built-in contracts and pipelines as configuration TOML
        #[arg(long)]
        toml: bool,
    },
}
