//! histlake ingestion library
//!
//! Turns plant-historian CSV exports, loose or bundled in zip archives, into a
//! partitioned Parquet dataset while keeping an SQLite ledger of what has
//! been ingested into which equipment scope.
//!
//! # Flow
//!
//! ```text
//! targets ─► FileCollector ─► candidates ─► IngestionPipeline ─► RunOutcome
//!               │ (ArchiveExpander,            │ (IngestionLedger,
//!               │  sandbox)                    │  SensorReader, DatasetWriter)
//! ```
//!
//! - [`sandbox`] decides which archive entry paths may be written
//! - [`archive`] expands zip files into `__extracted_csvs__`
//! - [`collector`] resolves targets into an ordered candidate list
//! - [`ledger`] stores processing history and parameter masters
//! - [`pipeline`] runs skip / parse / register / write / mark per file
//! - [`orchestrator`] ties collection and processing together
//!
//! # Example
//!
//! ```no_run
//! use histlake_ingest::{process_targets, IngestConfig};
//!
//! let config = IngestConfig::builder()
//!     .scope("plant1", "machine1", "pi")
//!     .file_name_pattern("2023")
//!     .build()?;
//! let outcome = process_targets(&config, &["/data/exports"], false)?;
//! println!("{}", serde_json::to_string_pretty(&outcome)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod reader;
pub mod sandbox;
pub mod scope;
pub mod writer;

pub use archive::ArchiveExpander;
pub use cli::Cli;
pub use collector::{CandidateFile, Collection, CollectorOptions, FileCollector};
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use ledger::{FileTransaction, IngestionLedger, LedgerCounts};
pub use orchestrator::{process_targets, Orchestrator, RunOutcome};
pub use pipeline::{FileOutcome, FileReport, IngestSummary, IngestionPipeline};
pub use reader::{HistorianCsvReader, ParsedFile, SensorReader, SensorTable};
pub use scope::ScopeResolver;
pub use writer::{DatasetWriter, ParquetDatasetWriter, WriteTarget};
