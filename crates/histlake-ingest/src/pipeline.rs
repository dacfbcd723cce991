//! Per-file ingestion pipeline
//!
//! For every candidate, in order:
//!
//! 1. resolve its [`Slot`] (file name + scope)
//! 2. skip it when the ledger already has the slot (unless forced)
//! 3. parse it with the [`SensorReader`]
//! 4. inside one ledger transaction: re-check the slot, register the header,
//!    write the dataset, mark the slot processed
//! 5. after commit, delete dataset files an earlier run of the slot recorded
//!    that the new run no longer produced
//!
//! The transaction only commits after the writer has returned, so a file is
//! never recorded as processed without its output. One file failing never
//! stops the batch; only errors that make the ledger itself unusable do.

use crate::collector::CandidateFile;
use crate::error::{IngestError, Result};
use crate::ledger::IngestionLedger;
use crate::reader::SensorReader;
use crate::scope::ScopeResolver;
use crate::writer::{DatasetWriter, WriteTarget};
use chrono::Utc;
use histlake_common::{checksum, ProcessedFileRecord, Slot};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Processed {
        rows: u64,
        outputs: Vec<PathBuf>,
        new_param_ids: Vec<String>,
    },
    Skipped,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub source_archive: Option<PathBuf>,

    /// Unset when the slot itself could not be resolved
    pub slot: Option<Slot>,
    pub outcome: FileOutcome,
}

/// Aggregate result of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl IngestSummary {
    fn record(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Processed { .. } => self.processed += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.files.push(report);
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct IngestionPipeline<'a, R, W, S> {
    ledger: &'a IngestionLedger,
    reader: R,
    writer: W,
    resolver: S,
}

impl<'a, R, W, S> IngestionPipeline<'a, R, W, S>
where
    R: SensorReader,
    W: DatasetWriter,
    S: ScopeResolver,
{
    pub fn new(ledger: &'a IngestionLedger, reader: R, writer: W, resolver: S) -> Self {
        Self {
            ledger,
            reader,
            writer,
            resolver,
        }
    }

    pub fn ledger(&self) -> &IngestionLedger {
        self.ledger
    }

    /// Process `candidates` in order.
    ///
    /// Per-file failures land in the summary; `Err` is reserved for
    /// [catastrophic](IngestError::is_catastrophic) errors.
    pub fn process(&self, candidates: &[CandidateFile], force: bool) -> Result<IngestSummary> {
        info!(candidates = candidates.len(), force, "Starting ingestion batch");

        let mut summary = IngestSummary::default();
        for candidate in candidates {
            let report = self.handle(candidate, force)?;
            summary.record(report);
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Ingestion batch finished"
        );
        Ok(summary)
    }

    fn handle(&self, candidate: &CandidateFile, force: bool) -> Result<FileReport> {
        let mut report = FileReport {
            path: candidate.path.clone(),
            source_archive: candidate.source_archive.clone(),
            slot: None,
            outcome: FileOutcome::Skipped,
        };

        let result = match self.resolve_slot(candidate) {
            Ok(slot) => {
                let result = self.ingest(candidate, &slot, force);
                report.slot = Some(slot);
                result
            },
            Err(e) => Err(e),
        };

        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_catastrophic() => return Err(e),
            Err(e) => {
                warn!(path = %candidate.path.display(), error = %e, "Failed to ingest file");
                FileOutcome::Failed { error: e.to_string() }
            },
        };
        Ok(report)
    }

    fn resolve_slot(&self, candidate: &CandidateFile) -> Result<Slot> {
        let file_name = candidate.file_name().ok_or_else(|| IngestError::Scope {
            path: candidate.path.clone(),
            message: "file name is not valid UTF-8".to_string(),
        })?;
        let scope = self.resolver.resolve(candidate)?;
        Ok(Slot::new(file_name, scope))
    }

    fn ingest(&self, candidate: &CandidateFile, slot: &Slot, force: bool) -> Result<FileOutcome> {
        if !force && self.ledger.is_processed(slot)? {
            debug!(%slot, "Already processed, skipping");
            return Ok(FileOutcome::Skipped);
        }

        let parsed = self.reader.read(&candidate.path)?;
        let sha256 = checksum::sha256_file(&candidate.path)?;

        let (outcome, stale) = self.ledger.within_file_transaction(|txn| {
            // Another writer may have committed the slot since the first check
            if !force && txn.is_processed(slot)? {
                debug!(%slot, "Processed concurrently, skipping");
                return Ok((FileOutcome::Skipped, Vec::new()));
            }

            let previous = txn
                .processed_record(slot)?
                .map(|record| record.output_paths)
                .unwrap_or_default();

            let now = Utc::now();
            let new_param_ids = txn.register_header(&slot.scope, &parsed.header, now)?;

            let target = WriteTarget {
                scope: &slot.scope,
                file_name: &slot.file_name,
            };
            let outputs = self.writer.write(&parsed.table, &target)?;
            let rows = parsed.table.len() as u64;

            txn.mark_processed(&ProcessedFileRecord {
                slot: slot.clone(),
                processed_at: now,
                source_path: Some(candidate.path.clone()),
                source_archive: candidate.source_archive.clone(),
                sha256: Some(sha256),
                row_count: Some(rows),
                output_paths: outputs.clone(),
            })?;

            info!(%slot, rows, outputs = outputs.len(), "Processed file");
            let stale: Vec<PathBuf> = previous
                .into_iter()
                .filter(|path| !outputs.contains(path))
                .collect();
            Ok((
                FileOutcome::Processed {
                    rows,
                    outputs,
                    new_param_ids,
                },
                stale,
            ))
        })?;

        remove_stale_outputs(slot, &stale);
        Ok(outcome)
    }
}

/// Delete dataset files a slot's earlier run wrote but the latest run did not
fn remove_stale_outputs(slot: &Slot, stale: &[PathBuf]) {
    for path in stale {
        match fs::remove_file(path) {
            Ok(()) => debug!(%slot, path = %path.display(), "Removed stale dataset file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(%slot, path = %path.display(), error = %e, "Failed to remove stale dataset file"),
        }
    }
}
