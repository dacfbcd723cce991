//! Top-level entry point: targets in, run outcome out

use crate::collector::{ArchiveFailure, Collection, FileCollector};
use crate::config::IngestConfig;
use crate::error::Result;
use crate::ledger::IngestionLedger;
use crate::pipeline::{IngestSummary, IngestionPipeline};
use crate::reader::{HistorianCsvReader, SensorReader};
use crate::scope::ScopeResolver;
use crate::writer::{DatasetWriter, ParquetDatasetWriter};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Result of [`Orchestrator::process_targets`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No target produced a candidate file
    NoWorkFound {
        archive_failures: Vec<ArchiveFailure>,
    },
    Completed {
        summary: IngestSummary,
        archive_failures: Vec<ArchiveFailure>,
    },
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&IngestSummary> {
        match self {
            RunOutcome::NoWorkFound { .. } => None,
            RunOutcome::Completed { summary, .. } => Some(summary),
        }
    }

    pub fn archive_failures(&self) -> &[ArchiveFailure] {
        match self {
            RunOutcome::NoWorkFound { archive_failures }
            | RunOutcome::Completed { archive_failures, .. } => archive_failures,
        }
    }

    /// Whether any file or archive failed
    pub fn has_failures(&self) -> bool {
        !self.archive_failures().is_empty() || self.summary().is_some_and(IngestSummary::has_failures)
    }
}

/// Collector plus pipeline
pub struct Orchestrator<'a, R, W, S> {
    collector: FileCollector,
    pipeline: IngestionPipeline<'a, R, W, S>,
    cleanup_extracted: bool,
}

impl<'a, R, W, S> Orchestrator<'a, R, W, S>
where
    R: SensorReader,
    W: DatasetWriter,
    S: ScopeResolver,
{
    pub fn new(collector: FileCollector, pipeline: IngestionPipeline<'a, R, W, S>) -> Self {
        Self {
            collector,
            pipeline,
            cleanup_extracted: false,
        }
    }

    /// Remove extraction sandboxes after each run
    pub fn with_cleanup(mut self, cleanup_extracted: bool) -> Self {
        self.cleanup_extracted = cleanup_extracted;
        self
    }

    pub fn process_targets<P: AsRef<Path>>(&self, targets: &[P], force: bool) -> Result<RunOutcome> {
        let collection = self.collector.collect(targets)?;

        if collection.is_empty() {
            info!(targets = targets.len(), "No candidate files found");
            self.cleanup(&collection);
            return Ok(RunOutcome::NoWorkFound {
                archive_failures: collection.archive_failures,
            });
        }

        let result = self.pipeline.process(&collection.candidates, force);
        self.cleanup(&collection);

        Ok(RunOutcome::Completed {
            summary: result?,
            archive_failures: collection.archive_failures,
        })
    }

    fn cleanup(&self, collection: &Collection) {
        if !self.cleanup_extracted {
            return;
        }
        if let Err(e) = collection.cleanup_extracted() {
            warn!(error = %e, "Failed to remove extracted files");
        }
    }
}

/// Run one ingestion with the default reader and writer.
///
/// Opens the ledger named by `config`, processes `targets`, and closes the
/// ledger again whether or not the run succeeded.
///
/// ```no_run
/// use histlake_ingest::{process_targets, IngestConfig, RunOutcome};
///
/// let config = IngestConfig::builder()
///     .scope("plant1", "machine1", "pi")
///     .build()?;
/// match process_targets(&config, &["data/2023"], false)? {
///     RunOutcome::NoWorkFound { .. } => println!("nothing to do"),
///     RunOutcome::Completed { summary, .. } => println!("{} processed", summary.processed),
/// }
/// # Ok::<(), histlake_ingest::IngestError>(())
/// ```
pub fn process_targets<P: AsRef<Path>>(
    config: &IngestConfig,
    targets: &[P],
    force: bool,
) -> Result<RunOutcome> {
    config.validate()?;
    let scope = config.scope()?;
    let ledger = IngestionLedger::open(&config.db_path)?;

    let outcome = {
        let pipeline = IngestionPipeline::new(
            &ledger,
            HistorianCsvReader::new(),
            ParquetDatasetWriter::new(&config.output_dir),
            scope,
        );
        Orchestrator::new(FileCollector::new(config.collector_options()), pipeline)
            .with_cleanup(config.cleanup_extracted)
            .process_targets(targets, force)
    };

    let closed = ledger.close();
    let outcome = outcome?;
    closed?;
    Ok(outcome)
}
