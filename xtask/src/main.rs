//! Build automation tasks for histlake
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for histlake", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the histlake-ingest CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<histlake_ingest::Cli>();

    let content = format!(
        r#"# histlake-ingest CLI Reference

Generated from the CLI source code on {}.

## Overview

`histlake-ingest` converts plant-historian CSV exports, loose or inside zip
archives, into a Parquet dataset partitioned as
`<output>/<plant>/<machine>/<data_source>/<year>/<month>/`. Every ingested file is recorded
in an SQLite ledger keyed by file name and equipment scope, so re-running the
same targets only picks up new files unless `--force` is given.

## Quick Start

```bash
# Ingest a month of exports for one machine
histlake-ingest --plant plant1 --machine 101 data/2023-01

# Only files whose name contains 2023, extracting archives to scratch space
histlake-ingest --plant plant1 --machine 101 \
  --pattern 2023 --scratch-dir /tmp/histlake --cleanup-extracted \
  data/

# Machine-readable report
histlake-ingest --plant plant1 --machine 101 --json data/ > report.json
```

## Exit Codes

- `0` - run completed (including "no candidate files found")
- `1` - run aborted (bad configuration, ledger unavailable)
- `2` - run completed but at least one file or archive failed

## Commands

{}

## Logging

- `HISTLAKE_LOG_LEVEL` - trace, debug, info, warn, error
- `HISTLAKE_LOG_OUTPUT` - console, file, both
- `HISTLAKE_LOG_FORMAT` - text, json
- `HISTLAKE_LOG_DIR` - directory for rolling log files
- `HISTLAKE_LOG_FILTER` - extra filter directives

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
