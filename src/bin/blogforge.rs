//! blogforge CLI Binary
//!
//! Command-line interface for the blogforge generation pipeline.

use anyhow::{anyhow, Context};
use blogforge::cli::{map_error, Cli, RunContext};
use blogforge::config::ConfigLoader;
use blogforge::logging::{init_logging, LoggingConfig};
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    // The provider API key usually lives in .env; a missing file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(cli);
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;

    info!("blogforge CLI starting");

    let context = RunContext::new(cli.workspace.clone(), cli.config.clone()).map_err(|e| {
        error!("Error loading configuration: {}", e);
        anyhow!(map_error(&e))
    })?;

    context.execute(&cli.command).map_err(|e| {
        error!("Command failed: {}", e);
        anyhow!(map_error(&e))
    })
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.workspace)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    };

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    } else if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }

    config
}
