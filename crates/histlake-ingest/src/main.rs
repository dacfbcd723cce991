//! histlake-ingest - historian CSV ingestion tool

use anyhow::Result;
use clap::Parser;
use histlake_common::logging::{init_logging, LogConfig, LogLevel};
use histlake_ingest::cli::{exit_code, render_text};
use histlake_ingest::{process_targets, Cli};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("histlake-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The tool still works without logging
    let guard = init_logging(&log_config).ok();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Ingestion failed");
            eprintln!("Error: {e:#}");
            1
        },
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = cli.to_config();
    info!(
        targets = cli.targets.len(),
        output = %config.output_dir.display(),
        db = %config.db_path.display(),
        force = cli.force,
        "Starting ingestion"
    );

    let outcome = process_targets(&config, &cli.targets, cli.force)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_text(&outcome));
    }

    info!("Ingestion complete");
    Ok(exit_code(&outcome))
}
