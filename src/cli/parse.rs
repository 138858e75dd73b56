//! CLI parse: clap types for blogforge. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blogforge - multi-agent blog generation
#[derive(Parser)]
#[command(name = "blogforge")]
#[command(about = "Generate a blog post from concurrent section agents and a compiler pass")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: warnings only)
    #[arg(long, short = 'v', default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short = 'q', default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline for a request file
    Run {
        /// Request file (TOML: user_message, requirements, temperature, [variables], [prompts])
        #[arg(long)]
        request: PathBuf,

        /// Override the request's user message
        #[arg(long)]
        message: Option<String>,

        /// Set a business variable (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Override the request's temperature (0.0 - 1.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// Write the document to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Do not persist progress or the artifact
        #[arg(long)]
        no_store: bool,
    },
    /// Show the effective section catalog
    Sections,
    /// Show stage progress for a run (latest run by default)
    Progress {
        /// Run id
        run_id: Option<String>,
    },
    /// List recorded artifacts, newest first
    Artifacts {
        /// Maximum number of artifacts to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
