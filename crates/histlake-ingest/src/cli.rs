//! Command-line surface of `histlake-ingest`

use crate::config::{IngestConfig, DEFAULT_DATA_SOURCE, DEFAULT_DB_PATH, DEFAULT_OUTPUT_DIR};
use crate::orchestrator::RunOutcome;
use crate::pipeline::FileOutcome;
use clap::Parser;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Ingest historian CSV exports (and zip archives of them) into a
/// partitioned Parquet dataset, skipping files that were already ingested.
#[derive(Parser, Debug)]
#[command(name = "histlake-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories, CSV files or zip archives to ingest
    #[arg(required = true)]
    pub targets: Vec<PathBuf>,

    /// Root of the Parquet dataset
    #[arg(short, long, env = "HISTLAKE_OUTPUT", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// SQLite ledger holding processing history and parameter masters
    #[arg(long, env = "HISTLAKE_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Plant the files belong to
    #[arg(short, long, env = "HISTLAKE_PLANT")]
    pub plant: String,

    /// Machine number within the plant
    #[arg(short, long, env = "HISTLAKE_MACHINE")]
    pub machine: String,

    /// Historian system the files were exported from
    #[arg(long, env = "HISTLAKE_DATA_SOURCE", default_value = DEFAULT_DATA_SOURCE)]
    pub data_source: String,

    /// Only ingest CSVs whose file name contains this text (repeatable)
    #[arg(long = "pattern", env = "HISTLAKE_PATTERN", value_delimiter = ',')]
    pub patterns: Vec<String>,

    /// Extract archives here instead of beside each archive
    #[arg(long, env = "HISTLAKE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Delete extracted CSVs after the run
    #[arg(long, env = "HISTLAKE_CLEANUP_EXTRACTED")]
    pub cleanup_extracted: bool,

    /// Reprocess files even if the ledger says they are done
    #[arg(short, long, env = "HISTLAKE_FORCE")]
    pub force: bool,

    /// Print the run report as JSON
    #[arg(long, env = "HISTLAKE_JSON")]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, env = "HISTLAKE_VERBOSE")]
    pub verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> IngestConfig {
        IngestConfig {
            output_dir: self.output.clone(),
            db_path: self.db.clone(),
            plant_name: self.plant.clone(),
            machine_no: self.machine.clone(),
            data_source: self.data_source.clone(),
            file_name_patterns: self.patterns.clone(),
            scratch_dir: self.scratch_dir.clone(),
            cleanup_extracted: self.cleanup_extracted,
        }
    }
}

/// Process exit status for a finished run
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    if outcome.has_failures() {
        2
    } else {
        0
    }
}

/// Human-readable run report
pub fn render_text(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    match outcome.summary() {
        None => out.push_str("No candidate files found\n"),
        Some(summary) => {
            for report in &summary.files {
                let line = match &report.outcome {
                    FileOutcome::Processed { rows, outputs, .. } => {
                        format!("processed  {} ({rows} rows, {} files)", report.path.display(), outputs.len())
                    },
                    FileOutcome::Skipped => format!("skipped    {}", report.path.display()),
                    FileOutcome::Failed { error } => format!("failed     {}: {error}", report.path.display()),
                };
                let _ = writeln!(out, "{line}");
            }
            let _ = writeln!(
                out,
                "\n{} processed, {} skipped, {} failed",
                summary.processed, summary.skipped, summary.failed
            );
        },
    }

    for failure in outcome.archive_failures() {
        let _ = writeln!(out, "archive failed: {}: {}", failure.archive.display(), failure.error);
    }

    out
}
